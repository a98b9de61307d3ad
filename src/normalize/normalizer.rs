use crate::normalize::error::NormalizeError;
use crate::types::forecast_request::ForecastRequest;
use crate::types::payload::RawPayload;
use crate::types::record::NormalizedRecord;
use chrono::{DateTime, Utc};

/// Reshapes one provider's raw payload into tidy records.
///
/// Implementations must be pure: the same payload and request always give
/// the same records in the same order, and nothing outside the arguments is
/// read or written.
pub trait Normalizer: Send + Sync {
    /// Measurement the records are stored under.
    fn measurement(&self) -> &str;

    /// Record fields that identify one series in the store.
    fn tag_columns(&self) -> &'static [&'static str];

    fn normalize(
        &self,
        payload: &RawPayload,
        request: &ForecastRequest,
    ) -> Result<Vec<NormalizedRecord>, NormalizeError>;
}

/// Seconds from `reference` to `valid`, rounded to the nearest second.
pub fn step_seconds(reference: DateTime<Utc>, valid: DateTime<Utc>) -> i64 {
    let millis = (valid - reference).num_milliseconds();
    (millis as f64 / 1000.0).round() as i64
}
