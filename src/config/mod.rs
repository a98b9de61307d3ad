pub mod collector_config;
pub mod environment;
pub mod error;
