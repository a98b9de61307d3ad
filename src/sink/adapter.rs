use crate::sink::error::SinkError;
use crate::types::record::WriteBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Write/delete contract of the time-series store.
///
/// Implementations keep no mutable state shared between calls, so workers
/// may write concurrently.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Stores one per-signal batch under `batch.measurement`.
    async fn write(&self, batch: &WriteBatch) -> Result<(), SinkError>;

    /// Removes every point of `measurement` between `start` and `stop`.
    async fn delete(
        &self,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        measurement: &str,
    ) -> Result<(), SinkError>;
}
