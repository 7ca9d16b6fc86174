use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AppLog {
    pub id: String,
    pub action: String,
    pub user_id: Option<String>,
    pub details: HashMap<String, String>,
    #[schema(value_type = String)]
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct OrganizationAudit {
    pub id: String,
    pub organization_id: String,
    pub action: String,
    pub user_id: Option<String>,
    pub details: HashMap<String, String>,
    #[schema(value_type = String)]
    pub timestamp: DateTime<Utc>,
}
