use crate::types::forecast_request::Resolution;
use polars::error::PolarsError;
use thiserror::Error;

/// Schema problems found while reshaping a provider payload.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Unknown column '{column}' in {provider} payload")]
    UnknownColumn { provider: String, column: String },

    #[error("Signal '{signal}' has no mapping for {provider}")]
    UnknownSignal { provider: String, signal: String },

    #[error("No conversion factor declared for energy signal '{signal}' at {resolution} resolution")]
    UndeclaredConversion {
        signal: String,
        resolution: Resolution,
    },

    #[error("Missing time column '{column}' in {provider} payload")]
    MissingTimeAxis { provider: String, column: String },

    #[error("Failed to parse timestamp '{value}'")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Column '{column}' has {found} values but the time axis has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("Malformed {provider} payload")]
    MalformedPayload {
        provider: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{provider} normalizer expects a {expected} payload, got {found}")]
    UnexpectedPayload {
        provider: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Failed frame operation on {provider} payload: {source}")]
    Frame {
        provider: String,
        #[source]
        source: PolarsError,
    },
}
