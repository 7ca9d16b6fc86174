use crate::core::errors::AccountingError;
use crate::infrastructure::cache::{Cache, cache_keys};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryCache {
    cache: Arc<RwLock<HashMap<String, (Vec<u8>, chrono::DateTime<chrono::Utc>)>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        InMemoryCache::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_public_key(&self, user_id: &str) -> Result<Option<Vec<u8>>, AccountingError> {
        let cache = self.cache.read().await;
        let key = cache_keys::public_key_key(user_id);
        Ok(cache
            .get(&key)
            .filter(|(_, expiry)| *expiry > chrono::Utc::now())
            .map(|(public_key, _)| public_key.clone()))
    }

    async fn save_public_key(
        &self,
        user_id: &str,
        public_key: &[u8],
        ttl: std::time::Duration,
    ) -> Result<(), AccountingError> {
        let mut cache = self.cache.write().await;
        let key = cache_keys::public_key_key(user_id);
        let expiry = chrono::Utc::now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| AccountingError::CacheError(format!("Failed to convert TTL: {}", e)))?;
        cache.insert(key, (public_key.to_vec(), expiry));
        Ok(())
    }
}
