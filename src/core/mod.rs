pub mod constants;
pub mod engine;
pub mod errors;
pub mod locks;
pub mod models;
pub mod quorum;
pub mod services;
pub mod time;
