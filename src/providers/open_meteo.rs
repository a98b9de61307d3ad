//! Open-Meteo ensemble API: request shaping and normalization of its nested
//! JSON response.
//!
//! The API answers with one `hourly` block holding a `time` axis and one array
//! per signal and ensemble member:
//!
//! ```text
//! {
//!   "latitude": 45.86, "longitude": 8.98, "elevation": 355.0,
//!   "hourly": {
//!     "time":                    ["2024-06-01T00:00", ...],
//!     "temperature_2m":          [14.2, ...],
//!     "temperature_2m_member01": [14.0, ...]
//!   }
//! }
//! ```

use crate::fetch::error::FetchError;
use crate::fetch::fetcher::Fetcher;
use crate::normalize::error::NormalizeError;
use crate::normalize::normalizer::{step_seconds, Normalizer};
use crate::normalize::signal_table::{Quantity, SignalTable};
use crate::types::forecast_request::{ForecastRequest, Resolution};
use crate::types::location::SeriesTags;
use crate::types::payload::RawPayload;
use crate::types::record::{NormalizedRecord, MEAN_MEMBER};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const PROVIDER_ID: &str = "open-meteo";
pub const MEASUREMENT: &str = "open-meteo";

const ENSEMBLE_URL: &str = "https://ensemble-api.open-meteo.com/v1/ensemble";

const HOURLY_SIGNALS: [&str; 6] = [
    "temperature_2m",
    "precipitation",
    "windspeed_10m",
    "shortwave_radiation",
    "direct_radiation",
    "diffuse_radiation",
];

const TAG_COLUMNS: &[&str] = &[
    "location",
    "latitude",
    "longitude",
    "elevation",
    "step",
    "model",
    "member",
];

/// Models queried by default, with their forecast horizon in days.
const MODELS: [(&str, i64); 2] = [("icon_seamless", 7), ("ecmwf_ifs04", 5)];
const DEFAULT_HORIZON_DAYS: i64 = 7;

pub struct OpenMeteoFetcher {
    client: Client,
    base_url: String,
    models: Vec<String>,
}

impl OpenMeteoFetcher {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, ENSEMBLE_URL)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            models: MODELS.iter().map(|(model, _)| model.to_string()).collect(),
        }
    }

    fn horizon(model: &str) -> Duration {
        let days = MODELS
            .iter()
            .find(|(name, _)| *name == model)
            .map(|(_, days)| *days)
            .unwrap_or(DEFAULT_HORIZON_DAYS);
        Duration::days(days)
    }

    /// Query string for one request; start and end dates are whole days.
    pub(crate) fn query(&self, request: &ForecastRequest) -> Vec<(&'static str, String)> {
        let start = request.reference_midnight();
        let end = start + Self::horizon(&request.model);
        vec![
            ("latitude", request.location.latitude.to_string()),
            ("longitude", request.location.longitude.to_string()),
            ("hourly", HOURLY_SIGNALS.join(",")),
            ("start_date", start.format("%Y-%m-%d").to_string()),
            ("end_date", end.format("%Y-%m-%d").to_string()),
            ("models", request.model.clone()),
        ]
    }
}

#[async_trait]
impl Fetcher for OpenMeteoFetcher {
    fn resolution(&self) -> Resolution {
        Resolution::OneHour
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    async fn fetch_once(&self, request: &ForecastRequest) -> Result<RawPayload, FetchError> {
        let url = self.base_url.clone();
        debug!(
            "Sending request for location {} time {} model {}",
            request.location.name, request.reference_time, request.model
        );

        let response = self
            .client
            .get(&url)
            .query(&self.query(request))
            .send()
            .await
            .map_err(|e| FetchError::NetworkRequest(url.clone(), e))?;

        let response = response
            .error_for_status()
            .map_err(|e| FetchError::from_status_error(url.clone(), e))?;

        let body = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| FetchError::Decode { url, source: e })?;

        Ok(RawPayload::Json(body))
    }
}

#[derive(Debug, Deserialize)]
struct EnsembleResponse {
    latitude: f64,
    longitude: f64,
    elevation: Option<f64>,
    hourly: HourlyBlock,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    time: Vec<String>,
    #[serde(flatten)]
    series: BTreeMap<String, Vec<Option<f64>>>,
}

/// Splits `temperature_2m_member07` into (`temperature_2m`, `member07`).
/// Columns without a member suffix belong to the `mean` member.
pub fn split_member(column: &str) -> (&str, &str) {
    match column.rsplit_once('_') {
        Some((base, suffix)) if suffix.starts_with("member") && !base.is_empty() => {
            (base, suffix)
        }
        _ => (column, MEAN_MEMBER),
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, NormalizeError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .map(|naive| naive.and_utc())
        .map_err(|e| NormalizeError::InvalidTimestamp {
            value: value.to_string(),
            source: e,
        })
}

pub struct OpenMeteoNormalizer {
    signals: SignalTable,
}

impl OpenMeteoNormalizer {
    pub fn new() -> Self {
        let signals = SignalTable::new(PROVIDER_ID)
            .signal("temperature_2m", "temperature_2m:°C", Quantity::Instantaneous)
            .signal("precipitation", "precipitation:mm", Quantity::Instantaneous)
            .signal("windspeed_10m", "windspeed_10m:km/h", Quantity::Instantaneous)
            .signal(
                "shortwave_radiation",
                "shortwave_radiation:W/m²",
                Quantity::Instantaneous,
            )
            .signal("direct_radiation", "direct_radiation:W/m²", Quantity::Instantaneous)
            .signal("diffuse_radiation", "diffuse_radiation:W/m²", Quantity::Instantaneous);
        Self { signals }
    }
}

impl Default for OpenMeteoNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer for OpenMeteoNormalizer {
    fn measurement(&self) -> &str {
        MEASUREMENT
    }

    fn tag_columns(&self) -> &'static [&'static str] {
        TAG_COLUMNS
    }

    fn normalize(
        &self,
        payload: &RawPayload,
        request: &ForecastRequest,
    ) -> Result<Vec<NormalizedRecord>, NormalizeError> {
        let value = match payload {
            RawPayload::Json(value) => value,
            other => {
                return Err(NormalizeError::UnexpectedPayload {
                    provider: PROVIDER_ID.to_string(),
                    expected: "json",
                    found: other.kind(),
                })
            }
        };

        let response = EnsembleResponse::deserialize(value).map_err(|e| {
            NormalizeError::MalformedPayload {
                provider: PROVIDER_ID.to_string(),
                source: e,
            }
        })?;

        let steps = response
            .hourly
            .time
            .iter()
            .map(|t| parse_time(t).map(|valid| step_seconds(request.reference_time, valid)))
            .collect::<Result<Vec<i64>, NormalizeError>>()?;

        let tags = Arc::new(SeriesTags {
            location: request.location.name.clone(),
            latitude: response.latitude,
            longitude: response.longitude,
            elevation: response.elevation,
        });

        let mut records = Vec::with_capacity(steps.len() * response.hourly.series.len());
        for (column, values) in &response.hourly.series {
            if values.len() != steps.len() {
                return Err(NormalizeError::LengthMismatch {
                    column: column.clone(),
                    expected: steps.len(),
                    found: values.len(),
                });
            }

            let (base, member) = split_member(column);
            let spec = self.signals.lookup(base)?;
            let factor = self.signals.factor(spec, request.resolution)?;

            records.extend(steps.iter().zip(values).map(|(step, value)| {
                NormalizedRecord {
                    reference_time: request.reference_time,
                    step: *step,
                    signal: spec.canonical.clone(),
                    model: request.model.clone(),
                    member: member.to_string(),
                    value: value.map(|v| v * factor).unwrap_or(f64::NAN),
                    tags: Arc::clone(&tags),
                }
            }));
        }

        Ok(records)
    }
}
