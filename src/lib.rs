pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod node;
pub mod scheduler;
pub mod shutdown;
pub mod sink;
pub mod storage;
