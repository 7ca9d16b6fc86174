pub mod in_memory;

use crate::core::errors::AccountingError;
use crate::core::models::audit::AppLog;
use async_trait::async_trait;

/// Audit trail of domain actions. `details` must be a JSON object of string values.
#[async_trait]
pub trait LoggingService: Send + Sync {
    async fn log_action(
        &self,
        action: &str,
        details: serde_json::Value,
        user_id: Option<&str>,
    ) -> Result<(), AccountingError>;
    async fn get_logs(&self) -> Result<Vec<AppLog>, AccountingError>;
}
