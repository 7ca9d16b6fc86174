pub mod audit;
pub mod organization;
pub mod transaction;
pub mod user;
