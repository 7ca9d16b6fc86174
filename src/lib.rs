pub mod api;
pub mod auth;
pub mod config;
pub mod core;
pub mod infrastructure;

pub use crate::core::engine::AuthorizationEngine;
pub use crate::core::errors::AccountingError;
pub use crate::core::services::OrganizationService;
pub use infrastructure::settlement::{SettlementGateway, http::ChainApiGateway};
pub use infrastructure::storage::in_memory::InMemoryStorage;

#[cfg(test)]
mod tests; // Include integration tests
