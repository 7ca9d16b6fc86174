pub mod cache;
pub mod logging;
pub mod settlement;
pub mod storage;
