pub mod error;
pub mod normalizer;
pub mod signal_table;
