//! Periodic collection of ensemble weather forecasts.
//!
//! Each configured provider runs on its own wall-clock aligned timer. A cycle
//! fetches every (location, model) pair with bounded retry, normalizes the
//! provider payload into tagged long-format records and hands them, grouped
//! per signal, to an InfluxDB sink and optionally to local Parquet files.
//!
//! ```no_run
//! use ensemble_collector::{build_scheduler, CollectorConfig, CollectorEnvironment};
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CollectorConfig::load(Path::new("config.json")).await?;
//! let environment = CollectorEnvironment::from_env(&config)?;
//! let scheduler = build_scheduler(&config, environment, reqwest::Client::new()).await?;
//! let handle = scheduler.start();
//! tokio::signal::ctrl_c().await?;
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
mod error;
pub mod fetch;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod providers;
pub mod sink;
pub mod types;
mod utils;

pub use collector::{build_scheduler, scheduler_from_file, CollectorEnvironment};
pub use config::collector_config::{CollectorConfig, ProviderConfig, SaveOptions};
pub use config::error::ConfigError;
pub use error::CollectorError;

pub use fetch::error::FetchError;
pub use fetch::fetcher::Fetcher;
pub use fetch::retry::{fetch_with_retry, RetryPolicy};

pub use normalize::error::NormalizeError;
pub use normalize::normalizer::Normalizer;

pub use pipeline::cycle_runner::{CycleReport, CycleRunner};
pub use pipeline::scheduler::{Scheduler, SchedulerHandle};

pub use providers::registry::{Provider, ProviderRegistry, RegistryError};

pub use sink::adapter::Sink;
pub use sink::error::SinkError;
pub use sink::influx::{InfluxSettings, InfluxSink};
pub use sink::local_store::ParquetStore;

pub use types::forecast_request::{ForecastRequest, Resolution};
pub use types::location::{Location, SeriesTags};
pub use types::payload::RawPayload;
pub use types::record::{NormalizedRecord, WriteBatch};
