pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod openapi;
