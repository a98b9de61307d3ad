use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode response body from {url}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to parse CSV response from {url}")]
    CsvRead {
        url: String,
        #[source]
        source: PolarsError,
    },

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Missing credentials for provider '{0}'")]
    MissingCredentials(String),

    #[error("Giving up on {provider} after {attempts} attempts")]
    RetriesExhausted {
        provider: String,
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Transport failures and non-success statuses are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::NetworkRequest(..) | FetchError::HttpStatus { .. }
        )
    }

    /// Maps a failed `error_for_status` into the matching variant.
    pub(crate) fn from_status_error(url: String, error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => FetchError::HttpStatus {
                url,
                status,
                source: error,
            },
            None => FetchError::NetworkRequest(url, error),
        }
    }
}
