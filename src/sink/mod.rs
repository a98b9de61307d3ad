pub mod adapter;
pub mod error;
pub mod influx;
pub mod local_store;
