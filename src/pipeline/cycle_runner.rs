//! One scheduled tick of one provider: fetch, normalize and store every
//! (location, model) unit with bounded concurrency.

use crate::fetch::error::FetchError;
use crate::fetch::retry::{fetch_with_retry, RetryPolicy};
use crate::normalize::error::NormalizeError;
use crate::providers::registry::{Provider, ProviderRegistry, RegistryError};
use crate::sink::adapter::Sink;
use crate::sink::error::SinkError;
use crate::sink::local_store::ParquetStore;
use crate::types::forecast_request::ForecastRequest;
use crate::types::location::Location;
use crate::types::record::group_by_signal;
use bon::bon;
use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

pub const DEFAULT_WORKERS: usize = 4;

/// Why a single (location, model) unit produced nothing.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

/// Outcome counts of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Units fetched and normalized.
    pub succeeded: usize,
    /// Units that failed to fetch or normalize.
    pub failed: usize,
    pub records: usize,
    pub batches_written: usize,
    /// Batches the sink rejected; they are dropped.
    pub batches_failed: usize,
}

#[derive(Debug, Default)]
struct UnitOutcome {
    records: usize,
    batches_written: usize,
    batches_failed: usize,
}

pub struct CycleRunner {
    registry: Arc<ProviderRegistry>,
    sink: Option<Arc<dyn Sink>>,
    local_store: Option<ParquetStore>,
    retry_policy: RetryPolicy,
    workers: usize,
}

#[bon]
impl CycleRunner {
    /// Builds a runner. Without a sink or local store the records are
    /// normalized and then discarded, which is only useful for dry runs.
    #[builder]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        sink: Option<Arc<dyn Sink>>,
        local_store: Option<ParquetStore>,
        retry_policy: Option<RetryPolicy>,
        workers: Option<usize>,
    ) -> Self {
        Self {
            registry,
            sink,
            local_store,
            retry_policy: retry_policy.unwrap_or_default(),
            workers: workers.unwrap_or(DEFAULT_WORKERS).max(1),
        }
    }

    /// Runs every (location, model) unit of `provider_id` for one reference
    /// time and waits for all of them.
    ///
    /// The provider is resolved once up front; an unknown id fails before
    /// any request is made. Failures of individual units are logged and
    /// counted, never propagated.
    pub async fn run_cycle(
        &self,
        provider_id: &str,
        reference_time: DateTime<Utc>,
        locations: &[Location],
    ) -> Result<CycleReport, RegistryError> {
        let provider = self.registry.resolve(provider_id)?;
        let resolution = provider.fetcher.resolution();
        let started = Instant::now();

        let requests: Vec<ForecastRequest> = locations
            .iter()
            .flat_map(|location| {
                provider.fetcher.models().iter().map(move |model| ForecastRequest {
                    location: location.clone(),
                    reference_time,
                    provider: provider_id.to_string(),
                    model: model.clone(),
                    resolution,
                })
            })
            .collect();
        info!(
            "Starting {} cycle at {} with {} units",
            provider_id,
            reference_time,
            requests.len()
        );

        let provider = &provider;
        let outcomes: Vec<(ForecastRequest, Result<UnitOutcome, CycleError>)> =
            stream::iter(requests)
                .map(|request| async move {
                    let outcome = self.run_unit(provider, &request).await;
                    (request, outcome)
                })
                .buffer_unordered(self.workers)
                .collect()
                .await;

        let mut report = CycleReport::default();
        for (request, outcome) in outcomes {
            match outcome {
                Ok(unit) => {
                    report.succeeded += 1;
                    report.records += unit.records;
                    report.batches_written += unit.batches_written;
                    report.batches_failed += unit.batches_failed;
                }
                Err(e) => {
                    report.failed += 1;
                    error!(
                        "{} model {} at {} failed: {}",
                        request.provider, request.model, request.location.name, e
                    );
                }
            }
        }

        info!(
            "Finished {} cycle in {:?}: {} ok, {} failed, {} batches written",
            provider_id,
            started.elapsed(),
            report.succeeded,
            report.failed,
            report.batches_written
        );
        Ok(report)
    }

    async fn run_unit(
        &self,
        provider: &Provider,
        request: &ForecastRequest,
    ) -> Result<UnitOutcome, CycleError> {
        let payload =
            fetch_with_retry(provider.fetcher.as_ref(), request, self.retry_policy).await?;
        let records = provider.normalizer.normalize(&payload, request)?;
        debug!(
            "Normalized {} records for {} model {} at {}",
            records.len(),
            request.provider,
            request.model,
            request.location.name
        );

        let mut outcome = UnitOutcome {
            records: records.len(),
            ..UnitOutcome::default()
        };

        if let Some(store) = &self.local_store {
            if let Err(e) = store.save(request, &records).await {
                error!("Could not save {} records locally: {}", request.provider, e);
            }
        }

        if let Some(sink) = &self.sink {
            let batches = group_by_signal(
                records,
                provider.normalizer.measurement(),
                provider.normalizer.tag_columns(),
            );
            for batch in &batches {
                match sink.write(batch).await {
                    Ok(()) => outcome.batches_written += 1,
                    Err(e) => {
                        outcome.batches_failed += 1;
                        log_sink_error(request, &batch.signal, &e);
                    }
                }
            }
        }
        Ok(outcome)
    }
}

fn log_sink_error(request: &ForecastRequest, signal: &str, e: &SinkError) {
    error!(
        "Dropping {} batch of {} model {} at {}: {}",
        signal, request.provider, request.model, request.location.name, e
    );
}
