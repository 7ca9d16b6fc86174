use crate::auth::jwt::JwtService;
use crate::core::errors::AccountingError;
use crate::core::models::user::Seed;
use crate::infrastructure::storage::Storage;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// The authenticated caller, passed explicitly into every engine and gateway call.
#[derive(Clone, Debug)]
pub struct CallerIdentity {
    pub user_id: Uuid,
    pub seed: Seed,
}

/// Resolves the caller of a request from its bearer token.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self, bearer_token: Option<&str>) -> Result<CallerIdentity, AccountingError>;
}

pub struct JwtIdentityProvider<S: Storage> {
    jwt: JwtService,
    storage: Arc<S>,
}

impl<S: Storage> JwtIdentityProvider<S> {
    pub fn new(jwt: JwtService, storage: Arc<S>) -> Self {
        JwtIdentityProvider { jwt, storage }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }
}

#[async_trait]
impl<S: Storage> IdentityProvider for JwtIdentityProvider<S> {
    async fn current_user(&self, bearer_token: Option<&str>) -> Result<CallerIdentity, AccountingError> {
        let token = bearer_token.ok_or_else(|| AccountingError::Unauthenticated("missing bearer token".to_string()))?;
        let claims = self.jwt.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AccountingError::Unauthenticated("malformed token subject".to_string()))?;

        let user = self
            .storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| AccountingError::Unauthenticated(format!("unknown user {}", user_id)))?;
        if !user.is_active() {
            return Err(AccountingError::Unauthenticated(format!("user {} is not activated", user_id)));
        }

        Ok(CallerIdentity {
            user_id: user.id,
            seed: user.seed,
        })
    }
}
