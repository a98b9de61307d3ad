//! Meteomatics time-series API: request shaping, CSV parsing and
//! normalization.
//!
//! Column names carry their accumulation interval and unit, and ensemble
//! columns a member suffix, e.g. `diffuse_rad_5min:Wh-m12`.

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
use chrono::{DateTime, Duration, Utc};
use log::debug;
use polars::prelude::*;
use reqwest::Client;
use std::io::Cursor;
use std::sync::Arc;
use tokio::task;

pub const NOWCASTING_PROVIDER_ID: &str = "meteomatics-nowcasting";
pub const HOURLY_PROVIDER_ID: &str = "meteomatics-hourly";

const API_URL: &str = "https://api.meteomatics.com";
const TIME_COLUMN: &str = "validdate";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const TAG_COLUMNS: &[&str] = &["location", "latitude", "longitude", "step", "model", "member"];

const NOWCASTING_PARAMETERS: &[&str] = &[
    "diffuse_rad_5min:Wh",
    "direct_rad_5min:Wh",
    "global_rad_5min:Wh",
    "precip_5min:mm",
];

const HOURLY_PARAMETERS: &[&str] = &[
    "diffuse_rad_1h:Wh",
    "direct_rad_1h:Wh",
    "global_rad_1h:Wh",
    "t_mean_2m_1h:C",
    "precip_1h:mm",
    "wind_speed_mean_10m_1h:kmh",
];

/// One model queried per location.
#[derive(Debug, Clone, PartialEq)]
struct ModelPlan {
    name: &'static str,
    /// Forecast horizon of the hourly product, counted from midnight.
    hourly_horizon_days: i64,
    ens_select: Option<&'static str>,
}

const MODEL_PLANS: [ModelPlan; 3] = [
    ModelPlan {
        name: "dwd-icon-eu",
        hourly_horizon_days: 5,
        ens_select: None,
    },
    ModelPlan {
        name: "ecmwf-ens",
        hourly_horizon_days: 7,
        ens_select: Some("member:1-50"),
    },
    ModelPlan {
        name: "ecmwf-ifs",
        hourly_horizon_days: 7,
        ens_select: None,
    },
];

/// Nowcasting requests look this far ahead of the reference time.
const NOWCASTING_HORIZON_HOURS: i64 = 6;

/// Meteomatics account used for HTTP basic auth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeteomaticsCredentials {
    pub username: String,
    pub password: String,
}

pub struct MeteomaticsFetcher {
    client: Client,
    base_url: String,
    credentials: MeteomaticsCredentials,
    resolution: Resolution,
    models: Vec<String>,
}

impl MeteomaticsFetcher {
    pub fn new(client: Client, credentials: MeteomaticsCredentials, resolution: Resolution) -> Self {
        Self {
            client,
            base_url: API_URL.to_string(),
            credentials,
            resolution,
            models: MODEL_PLANS.iter().map(|plan| plan.name.to_string()).collect(),
        }
    }

    fn plan(model: &str) -> Option<&'static ModelPlan> {
        MODEL_PLANS.iter().find(|plan| plan.name == model)
    }

    fn parameters(&self) -> &'static [&'static str] {
        match self.resolution {
            Resolution::FiveMinutes => NOWCASTING_PARAMETERS,
            Resolution::OneHour => HOURLY_PARAMETERS,
        }
    }

    /// Requested valid-time window for one request.
    pub(crate) fn window(&self, request: &ForecastRequest) -> (DateTime<Utc>, DateTime<Utc>) {
        match self.resolution {
            Resolution::FiveMinutes => (
                request.reference_time,
                request.reference_time + Duration::hours(NOWCASTING_HORIZON_HOURS),
            ),
            Resolution::OneHour => {
                let start = request.reference_midnight();
                let days = Self::plan(&request.model)
                    .map(|plan| plan.hourly_horizon_days)
                    .unwrap_or(5);
                (start, start + Duration::days(days))
            }
        }
    }

    /// Path-encoded request URL, without the query string.
    pub(crate) fn url(&self, request: &ForecastRequest) -> String {
        let (start, end) = self.window(request);
        format!(
            "{}/{}--{}:{}/{}/{},{}/csv",
            self.base_url,
            start.format(TIMESTAMP_FORMAT),
            end.format(TIMESTAMP_FORMAT),
            self.resolution.iso_period(),
            self.parameters().join(","),
            request.location.latitude,
            request.location.longitude,
        )
    }

    pub(crate) fn query(&self, request: &ForecastRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![("model", request.model.clone())];
        if let Some(ens_select) = Self::plan(&request.model).and_then(|plan| plan.ens_select) {
            query.push(("ens_select", ens_select.to_string()));
        }
        query
    }

    /// Parses the `;`-separated CSV body into a frame on a blocking thread.
    ///
    /// Types are inferred from every row: multi-day hourly responses exceed
    /// the default inference window, and a column that is whole numbers in
    /// its first rows may carry decimals later.
    async fn csv_to_dataframe(url: String, bytes: Vec<u8>) -> Result<DataFrame, FetchError> {
        task::spawn_blocking(move || {
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(None)
                .with_parse_options(CsvParseOptions::default().with_separator(b';'))
                .into_reader_with_file_handle(Cursor::new(bytes))
                .finish()
                .map_err(|e| FetchError::CsvRead { url, source: e })
        })
        .await?
    }
}

#[async_trait]
impl Fetcher for MeteomaticsFetcher {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    async fn fetch_once(&self, request: &ForecastRequest) -> Result<RawPayload, FetchError> {
        if self.credentials.username.is_empty() || self.credentials.password.is_empty() {
            return Err(FetchError::MissingCredentials(request.provider.clone()));
        }
        let url = self.url(request);
        debug!(
            "Sending request for location {} time {} model {} step {}",
            request.location.name, request.reference_time, request.model, self.resolution
        );

        let response = self
            .client
            .get(&url)
            .query(&self.query(request))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await
            .map_err(|e| FetchError::NetworkRequest(url.clone(), e))?;

        let response = response
            .error_for_status()
            .map_err(|e| FetchError::from_status_error(url.clone(), e))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Decode {
                url: url.clone(),
                source: e,
            })?;

        let frame = Self::csv_to_dataframe(url, bytes.to_vec()).await?;
        Ok(RawPayload::Table(frame))
    }
}

/// A decomposed Meteomatics column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnName {
    /// Parameter without its interval, e.g. `diffuse_rad:Wh`.
    pub base: String,
    pub interval: Resolution,
    pub member: String,
}

/// Decomposes `diffuse_rad_5min:Wh-m12` into (`diffuse_rad:Wh`, 5 min, `12`).
///
/// Returns `None` when the name has no unit or no known interval token.
pub fn parse_column(column: &str) -> Option<ColumnName> {
    let (parameter, member) = match column.rsplit_once("-m") {
        Some((parameter, member))
            if !member.is_empty() && member.chars().all(|c| c.is_ascii_digit()) =>
        {
            (parameter, member)
        }
        _ => (column, MEAN_MEMBER),
    };

    let (name, unit) = parameter.split_once(':')?;
    let (signal, interval_token) = name.rsplit_once('_')?;
    let interval = Resolution::from_token(interval_token)?;

    Some(ColumnName {
        base: format!("{}:{}", signal, unit),
        interval,
        member: member.to_string(),
    })
}

pub struct MeteomaticsNormalizer {
    provider: String,
    measurement: String,
    signals: SignalTable,
}

impl MeteomaticsNormalizer {
    pub fn new(provider: &str, resolution: Resolution) -> Self {
        let signals = SignalTable::new(provider)
            .signal("diffuse_rad:Wh", "diffuse_radiation:W/m²", Quantity::EnergyPerInterval)
            .signal("direct_rad:Wh", "direct_radiation:W/m²", Quantity::EnergyPerInterval)
            .signal("global_rad:Wh", "shortwave_radiation:W/m²", Quantity::EnergyPerInterval)
            .signal("t_mean_2m:C", "temperature_2m:°C", Quantity::Instantaneous)
            .signal("precip:mm", "precipitation:mm", Quantity::Instantaneous)
            .signal("wind_speed_mean_10m:kmh", "windspeed_10m:km/h", Quantity::Instantaneous)
            // Wh accumulated over 5 minutes -> W/m²: 60 min / 5 min
            .energy_factor(Resolution::FiveMinutes, 12.0)
            .energy_factor(Resolution::OneHour, 1.0);

        Self {
            provider: provider.to_string(),
            measurement: format!("meteomatics_{}", resolution.token()),
            signals,
        }
    }

    fn frame_error(&self, source: PolarsError) -> NormalizeError {
        NormalizeError::Frame {
            provider: self.provider.clone(),
            source,
        }
    }

    fn steps(&self, frame: &DataFrame, reference: DateTime<Utc>) -> Result<Vec<i64>, NormalizeError> {
        let times = frame
            .column(TIME_COLUMN)
            .map_err(|_| NormalizeError::MissingTimeAxis {
                provider: self.provider.clone(),
                column: TIME_COLUMN.to_string(),
            })?
            .str()
            .map_err(|e| self.frame_error(e))?;

        times
            .into_iter()
            .map(|value| {
                let value = value.unwrap_or_default();
                DateTime::parse_from_rfc3339(value)
                    .map(|valid| step_seconds(reference, valid.with_timezone(&Utc)))
                    .map_err(|e| NormalizeError::InvalidTimestamp {
                        value: value.to_string(),
                        source: e,
                    })
            })
            .collect()
    }
}

impl Normalizer for MeteomaticsNormalizer {
    fn measurement(&self) -> &str {
        &self.measurement
    }

    fn tag_columns(&self) -> &'static [&'static str] {
        TAG_COLUMNS
    }

    fn normalize(
        &self,
        payload: &RawPayload,
        request: &ForecastRequest,
    ) -> Result<Vec<NormalizedRecord>, NormalizeError> {
        let frame = match payload {
            RawPayload::Table(frame) => frame,
            other => {
                return Err(NormalizeError::UnexpectedPayload {
                    provider: self.provider.clone(),
                    expected: "table",
                    found: other.kind(),
                })
            }
        };

        let steps = self.steps(frame, request.reference_time)?;
        let tags = Arc::new(SeriesTags::from_location(&request.location));

        let mut records = Vec::with_capacity(steps.len() * frame.width().saturating_sub(1));
        for column in frame.get_columns() {
            let name = column.name().as_str();
            if name == TIME_COLUMN {
                continue;
            }

            let parsed = parse_column(name).ok_or_else(|| NormalizeError::UnknownColumn {
                provider: self.provider.clone(),
                column: name.to_string(),
            })?;
            let spec = self.signals.lookup(&parsed.base)?;
            let factor = self.signals.factor(spec, parsed.interval)?;

            let values = column
                .cast(&DataType::Float64)
                .map_err(|e| self.frame_error(e))?;
            let values = values.f64().map_err(|e| self.frame_error(e))?;

            records.extend(steps.iter().zip(values.into_iter()).map(|(step, value)| {
                NormalizedRecord {
                    reference_time: request.reference_time,
                    step: *step,
                    signal: spec.canonical.clone(),
                    model: request.model.clone(),
                    member: parsed.member.clone(),
                    value: value.map(|v| v * factor).unwrap_or(f64::NAN),
                    tags: Arc::clone(&tags),
                }
            }));
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::location::Location;
    use chrono::TimeZone;

    fn request(resolution: Resolution, model: &str) -> ForecastRequest {
        ForecastRequest {
            location: Location::new("SUPSI Mendrisio", 45.8683146, 8.9767214),
            reference_time: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            provider: NOWCASTING_PROVIDER_ID.to_string(),
            model: model.to_string(),
            resolution,
        }
    }

    fn fetcher(resolution: Resolution) -> MeteomaticsFetcher {
        MeteomaticsFetcher::new(
            Client::new(),
            MeteomaticsCredentials {
                username: "user".to_string(),
                password: "secret".to_string(),
            },
            resolution,
        )
    }

    #[test]
    fn test_parse_column() {
        assert_eq!(
            parse_column("diffuse_rad_5min:Wh-m12"),
            Some(ColumnName {
                base: "diffuse_rad:Wh".to_string(),
                interval: Resolution::FiveMinutes,
                member: "12".to_string(),
            })
        );
        assert_eq!(
            parse_column("wind_speed_mean_10m_1h:kmh"),
            Some(ColumnName {
                base: "wind_speed_mean_10m:kmh".to_string(),
                interval: Resolution::OneHour,
                member: "mean".to_string(),
            })
        );
        assert_eq!(parse_column("t_2m:C"), None);
        assert_eq!(parse_column("diffuse_rad_5min"), None);
    }

    #[test]
    fn test_five_minute_energy_is_converted_to_power() -> Result<(), Box<dyn std::error::Error>> {
        let frame = polars::df!(
            "validdate" => ["2024-06-01T12:00:00Z", "2024-06-01T12:05:00Z"],
            "diffuse_rad_5min:Wh" => [10.0, 5.5],
            "t_mean_2m_1h:C" => [20.0, 20.5]
        )?;
        let normalizer = MeteomaticsNormalizer::new(NOWCASTING_PROVIDER_ID, Resolution::FiveMinutes);

        let records = normalizer.normalize(
            &RawPayload::Table(frame),
            &request(Resolution::FiveMinutes, "dwd-icon-eu"),
        )?;

        assert_eq!(records.len(), 4);
        let rad: Vec<(i64, f64)> = records
            .iter()
            .filter(|r| r.signal == "diffuse_radiation:W/m²")
            .map(|r| (r.step, r.value))
            .collect();
        assert_eq!(rad, vec![(0, 120.0), (300, 66.0)]);

        let temp: Vec<f64> = records
            .iter()
            .filter(|r| r.signal == "temperature_2m:°C")
            .map(|r| r.value)
            .collect();
        assert_eq!(temp, vec![20.0, 20.5]);
        assert_eq!(normalizer.measurement(), "meteomatics_5min");
        Ok(())
    }

    #[test]
    fn test_hourly_energy_is_unchanged() -> Result<(), Box<dyn std::error::Error>> {
        let frame = polars::df!(
            "validdate" => ["2024-06-01T15:00:00Z"],
            "diffuse_rad_1h:Wh" => [10.0]
        )?;
        let normalizer = MeteomaticsNormalizer::new(HOURLY_PROVIDER_ID, Resolution::OneHour);

        let records = normalizer.normalize(
            &RawPayload::Table(frame),
            &request(Resolution::OneHour, "dwd-icon-eu"),
        )?;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, 10.0);
        assert_eq!(records[0].step, 10_800);
        Ok(())
    }

    #[test]
    fn test_ensemble_members_and_counts() -> Result<(), Box<dyn std::error::Error>> {
        let frame = polars::df!(
            "validdate" => ["2024-06-01T12:00:00Z", "2024-06-01T13:00:00Z", "2024-06-01T14:00:00Z"],
            "precip_1h:mm-m1" => [0.0, 0.1, 0.2],
            "precip_1h:mm-m2" => [0.0, 0.3, 0.0],
            "t_mean_2m_1h:C-m1" => [20.0, 21.0, 22.0],
            "t_mean_2m_1h:C-m2" => [19.0, 20.0, 21.0]
        )?;
        let normalizer = MeteomaticsNormalizer::new(HOURLY_PROVIDER_ID, Resolution::OneHour);

        let records = normalizer.normalize(
            &RawPayload::Table(frame),
            &request(Resolution::OneHour, "ecmwf-ens"),
        )?;

        // 3 timestamps x 2 signals x 2 members
        assert_eq!(records.len(), 12);
        assert!(records.iter().all(|r| r.member == "1" || r.member == "2"));
        assert!(records.iter().all(|r| r.model == "ecmwf-ens"));
        assert!(records.iter().all(|r| r.tags.location == "SUPSI Mendrisio"));
        Ok(())
    }

    #[test]
    fn test_unknown_column_fails() -> Result<(), Box<dyn std::error::Error>> {
        let frame = polars::df!(
            "validdate" => ["2024-06-01T12:00:00Z"],
            "sunshine_duration:min" => [3.0]
        )?;
        let normalizer = MeteomaticsNormalizer::new(NOWCASTING_PROVIDER_ID, Resolution::FiveMinutes);

        let err = normalizer
            .normalize(
                &RawPayload::Table(frame),
                &request(Resolution::FiveMinutes, "dwd-icon-eu"),
            )
            .unwrap_err();

        assert!(matches!(err, NormalizeError::UnknownColumn { column, .. } if column == "sunshine_duration:min"));
        Ok(())
    }

    #[test]
    fn test_missing_time_axis_fails() -> Result<(), Box<dyn std::error::Error>> {
        let frame = polars::df!("precip_5min:mm" => [0.0])?;
        let normalizer = MeteomaticsNormalizer::new(NOWCASTING_PROVIDER_ID, Resolution::FiveMinutes);

        let err = normalizer
            .normalize(
                &RawPayload::Table(frame),
                &request(Resolution::FiveMinutes, "dwd-icon-eu"),
            )
            .unwrap_err();

        assert!(matches!(err, NormalizeError::MissingTimeAxis { .. }));
        Ok(())
    }

    #[test]
    fn test_nowcasting_url_and_query() {
        let fetcher = fetcher(Resolution::FiveMinutes);
        let request = request(Resolution::FiveMinutes, "ecmwf-ens");

        assert_eq!(
            fetcher.url(&request),
            "https://api.meteomatics.com/2024-06-01T12:00:00Z--2024-06-01T18:00:00Z:PT5M/\
             diffuse_rad_5min:Wh,direct_rad_5min:Wh,global_rad_5min:Wh,precip_5min:mm/\
             45.8683146,8.9767214/csv"
        );
        assert_eq!(
            fetcher.query(&request),
            vec![
                ("model", "ecmwf-ens".to_string()),
                ("ens_select", "member:1-50".to_string())
            ]
        );
    }

    #[test]
    fn test_hourly_window_depends_on_model() {
        let fetcher = fetcher(Resolution::OneHour);
        let midnight = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let (start, end) = fetcher.window(&request(Resolution::OneHour, "dwd-icon-eu"));
        assert_eq!(start, midnight);
        assert_eq!(end, midnight + Duration::days(5));

        let (_, end) = fetcher.window(&request(Resolution::OneHour, "ecmwf-ifs"));
        assert_eq!(end, midnight + Duration::days(7));
    }

    #[tokio::test]
    async fn test_csv_types_are_inferred_from_all_rows() -> Result<(), Box<dyn std::error::Error>> {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut body = String::from("validdate;precip_1h:mm\n");
        for hour in 0..169 {
            let value = if hour < 120 { "0" } else { "0.3" };
            body.push_str(&format!(
                "{};{}\n",
                (start + Duration::hours(hour)).format(TIMESTAMP_FORMAT),
                value
            ));
        }

        let frame =
            MeteomaticsFetcher::csv_to_dataframe("test".to_string(), body.into_bytes()).await?;
        assert_eq!(frame.height(), 169);

        let normalizer = MeteomaticsNormalizer::new(HOURLY_PROVIDER_ID, Resolution::OneHour);
        let mut request = request(Resolution::OneHour, "ecmwf-ifs");
        request.reference_time = start;
        let records = normalizer.normalize(&RawPayload::Table(frame), &request)?;
        assert_eq!(records.len(), 169);
        assert_eq!(records[0].value, 0.0);
        assert_eq!(records[168].value, 0.3);
        assert_eq!(records[168].step, 168 * 3600);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_credentials_fail_without_request() {
        let fetcher = MeteomaticsFetcher::new(
            Client::new(),
            MeteomaticsCredentials {
                username: "user".to_string(),
                password: String::new(),
            },
            Resolution::FiveMinutes,
        );

        let result = fetcher
            .fetch_once(&request(Resolution::FiveMinutes, "dwd-icon-eu"))
            .await;
        assert!(matches!(
            result,
            Err(FetchError::MissingCredentials(provider)) if provider == NOWCASTING_PROVIDER_ID
        ));
    }
}
