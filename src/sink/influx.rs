//! InfluxDB v2 sink speaking line protocol over HTTP.

use crate::sink::adapter::Sink;
use crate::sink::error::SinkError;
use crate::types::record::{NormalizedRecord, WriteBatch};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde_json::json;
use std::time::Duration;

/// Writes and deletes can be slow on a busy server.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings, read from the environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfluxSettings {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

pub struct InfluxSink {
    client: Client,
    settings: InfluxSettings,
}

impl InfluxSink {
    pub fn new(client: Client, settings: InfluxSettings) -> Self {
        Self { client, settings }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v2/{}", self.settings.url.trim_end_matches('/'), path)
    }

    async fn check(url: String, response: Result<Response, reqwest::Error>) -> Result<(), SinkError> {
        let response = response.map_err(|e| SinkError::NetworkRequest(url.clone(), e))?;
        match response.error_for_status() {
            Ok(_) => Ok(()),
            Err(e) => Err(match e.status() {
                Some(status) => SinkError::HttpStatus {
                    url,
                    status,
                    source: e,
                },
                None => SinkError::NetworkRequest(url, e),
            }),
        }
    }
}

#[async_trait]
impl Sink for InfluxSink {
    async fn write(&self, batch: &WriteBatch) -> Result<(), SinkError> {
        let body = to_line_protocol(batch);
        if body.is_empty() {
            debug!(
                "Nothing to write for {} {}: every value is missing",
                batch.measurement, batch.signal
            );
            return Ok(());
        }

        let url = self.endpoint("write");
        let response = self
            .client
            .post(&url)
            .query(&[
                ("org", self.settings.org.as_str()),
                ("bucket", self.settings.bucket.as_str()),
                ("precision", "s"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.settings.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .timeout(REQUEST_TIMEOUT)
            .body(body)
            .send()
            .await;
        Self::check(url, response).await?;
        debug!(
            "Wrote {} records of {} to {}",
            batch.len(),
            batch.signal,
            batch.measurement
        );
        Ok(())
    }

    async fn delete(
        &self,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        measurement: &str,
    ) -> Result<(), SinkError> {
        info!(
            "Deleting influx {} data from {} to {}",
            measurement, start, stop
        );
        let url = self.endpoint("delete");
        let response = self
            .client
            .post(&url)
            .query(&[
                ("org", self.settings.org.as_str()),
                ("bucket", self.settings.bucket.as_str()),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.settings.token))
            .timeout(REQUEST_TIMEOUT)
            .json(&delete_body(start, stop, measurement))
            .send()
            .await;
        Self::check(url, response).await
    }
}

fn delete_body(start: DateTime<Utc>, stop: DateTime<Utc>, measurement: &str) -> serde_json::Value {
    json!({
        "start": start.to_rfc3339_opts(SecondsFormat::Secs, true),
        "stop": stop.to_rfc3339_opts(SecondsFormat::Secs, true),
        "predicate": format!("_measurement=\"{}\"", measurement.replace('"', "\\\"")),
    })
}

fn escape_measurement(value: &str) -> String {
    value.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escaping shared by tag keys, tag values and field keys.
fn escape_key(value: &str) -> String {
    value
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

fn tag_value(record: &NormalizedRecord, column: &str) -> Option<String> {
    match column {
        "location" => Some(record.tags.location.clone()),
        "latitude" => Some(record.tags.latitude.to_string()),
        "longitude" => Some(record.tags.longitude.to_string()),
        "elevation" => record.tags.elevation.map(|e| e.to_string()),
        "step" => Some(record.step.to_string()),
        "model" => Some(record.model.clone()),
        "member" => Some(record.member.clone()),
        _ => None,
    }
}

/// Renders a batch as line protocol, one line per finite value, timestamped
/// with the reference time in seconds.
pub fn to_line_protocol(batch: &WriteBatch) -> String {
    let measurement = escape_measurement(&batch.measurement);
    let field = escape_key(&batch.signal);

    batch
        .records
        .iter()
        .filter(|record| record.value.is_finite())
        .map(|record| {
            let tags: String = batch
                .tag_columns
                .iter()
                .filter_map(|column| {
                    tag_value(record, column)
                        .filter(|value| !value.is_empty())
                        .map(|value| format!(",{}={}", escape_key(column), escape_key(&value)))
                })
                .collect();
            format!(
                "{}{} {}={} {}",
                measurement,
                tags,
                field,
                record.value,
                record.reference_time.timestamp()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
