use crate::fetch::error::FetchError;
use crate::types::forecast_request::{ForecastRequest, Resolution};
use crate::types::payload::RawPayload;
use async_trait::async_trait;

/// Provider-specific request shaping.
///
/// A fetcher performs exactly one attempt per call; retrying is layered on
/// top by [`crate::fetch_with_retry`] so every provider obeys the same
/// contract.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Resolution of the rows this fetcher requests.
    fn resolution(&self) -> Resolution;

    /// Models queried for every location, in request order.
    fn models(&self) -> &[String];

    /// Executes a single request.
    async fn fetch_once(&self, request: &ForecastRequest) -> Result<RawPayload, FetchError>;
}
