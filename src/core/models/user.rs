use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Secret seed material of a user.
///
/// Never printed and never serialized; the only place its bytes leave the process is
/// the credential header of a settlement request.
#[derive(Clone, PartialEq, Eq)]
pub struct Seed(Vec<u8>);

impl Seed {
    pub fn new(bytes: Vec<u8>) -> Self {
        Seed(bytes)
    }

    pub fn from_hex(value: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(value.trim_start_matches("0x")).map(Seed)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Seed(<redacted>)")
    }
}

#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub seed: Seed,
    pub mnemonic: Option<String>,
    pub activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.activated_at.is_some()
    }

    /// Material handed to the settlement service for public key derivation.
    pub fn seed_phrase(&self) -> String {
        match &self.mnemonic {
            Some(mnemonic) => mnemonic.clone(),
            None => self.seed.to_hex(),
        }
    }
}

/// Public projection of a [`User`], safe to return from the API.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UserView {
    pub id: Uuid,
    #[schema(value_type = Option<String>)]
    pub activated_at: Option<DateTime<Utc>>,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        UserView {
            id: user.id,
            activated_at: user.activated_at,
            created_at: user.created_at,
        }
    }
}
