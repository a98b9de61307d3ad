pub mod cycle_runner;
pub mod scheduler;
