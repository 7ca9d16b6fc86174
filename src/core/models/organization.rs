use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    FirstAdmin,
    Admin,
    Employee,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::FirstAdmin => "FIRST_ADMIN",
            Role::Admin => "ADMIN",
            Role::Employee => "EMPLOYEE",
        };
        write!(f, "{}", s)
    }
}

/// How many distinct confirmations a transaction of an organization needs.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "type", content = "required", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuorumPolicy {
    #[default]
    AllParticipants,
    Threshold(u32),
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub quorum: QuorumPolicy,
    pub multisig_address: Option<String>,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct OrganizationParticipant {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    #[schema(value_type = String)]
    pub joined_at: DateTime<Utc>,
    #[schema(value_type = Option<String>)]
    pub left_at: Option<DateTime<Utc>>,
}

impl OrganizationParticipant {
    pub fn is_first_admin(&self) -> bool {
        self.role == Role::FirstAdmin
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::FirstAdmin | Role::Admin)
    }

    pub fn has_left(&self) -> bool {
        self.left_at.is_some()
    }
}
