pub mod cache_keys;
pub mod in_memory;

use crate::core::errors::AccountingError;
use async_trait::async_trait;

/// Cache for settlement-derived public keys, so repeated wallet setup does not
/// hit the settlement service once per owner.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_public_key(&self, user_id: &str) -> Result<Option<Vec<u8>>, AccountingError>;
    async fn save_public_key(
        &self,
        user_id: &str,
        public_key: &[u8],
        ttl: std::time::Duration,
    ) -> Result<(), AccountingError>;
}
