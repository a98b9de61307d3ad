//! Optional Parquet persistence of each normalized record set.

use crate::sink::error::SinkError;
use crate::types::forecast_request::ForecastRequest;
use crate::types::record::NormalizedRecord;
use log::debug;
use polars::prelude::*;
use std::path::PathBuf;
use tokio::task;

const REFERENCE_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%SZ";

/// Writes one Parquet file per provider, model, location and cycle below a
/// root directory.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    root: PathBuf,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `{root}/{provider}/{model}/{provider}_{model}_{resolution}_{location}_{reference}.parquet`
    pub fn file_path(&self, request: &ForecastRequest) -> PathBuf {
        let file_name = format!(
            "{}_{}_{}_{}_{}.parquet",
            request.provider,
            request.model,
            request.resolution.token(),
            request.location.file_safe_name(),
            request.reference_time.format(REFERENCE_TIME_FORMAT)
        );
        self.root
            .join(&request.provider)
            .join(&request.model)
            .join(file_name)
    }

    /// Persists `records` for `request`, returning the written path.
    pub async fn save(
        &self,
        request: &ForecastRequest,
        records: &[NormalizedRecord],
    ) -> Result<PathBuf, SinkError> {
        let path = self.file_path(request);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SinkError::DirectoryCreation(parent.to_path_buf(), e))?;
        }

        let mut df = records_to_dataframe(records)?;
        let target = path.clone();
        task::spawn_blocking(move || {
            let file = std::fs::File::create(&target)
                .map_err(|e| SinkError::ParquetWriteIo(target.clone(), e))?;
            ParquetWriter::new(file)
                .with_compression(ParquetCompression::Snappy)
                .finish(&mut df)
                .map_err(|e| SinkError::ParquetWritePolars(target.clone(), e))?;
            Ok::<(), SinkError>(())
        })
        .await??;

        debug!("Saved {} records to {}", records.len(), path.display());
        Ok(path)
    }
}

/// Long-format frame with one row per record.
pub fn records_to_dataframe(records: &[NormalizedRecord]) -> PolarsResult<DataFrame> {
    let reference_ms: Vec<i64> = records
        .iter()
        .map(|r| r.reference_time.timestamp_millis())
        .collect();
    let reference_time = Column::new("reference_time".into(), reference_ms)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;

    DataFrame::new(vec![
        reference_time,
        Column::new(
            "step".into(),
            records.iter().map(|r| r.step).collect::<Vec<_>>(),
        ),
        Column::new(
            "signal".into(),
            records.iter().map(|r| r.signal.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "model".into(),
            records.iter().map(|r| r.model.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "member".into(),
            records.iter().map(|r| r.member.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "value".into(),
            records.iter().map(|r| r.value).collect::<Vec<_>>(),
        ),
        Column::new(
            "location".into(),
            records
                .iter()
                .map(|r| r.tags.location.as_str())
                .collect::<Vec<_>>(),
        ),
        Column::new(
            "latitude".into(),
            records.iter().map(|r| r.tags.latitude).collect::<Vec<_>>(),
        ),
        Column::new(
            "longitude".into(),
            records.iter().map(|r| r.tags.longitude).collect::<Vec<_>>(),
        ),
        Column::new(
            "elevation".into(),
            records.iter().map(|r| r.tags.elevation).collect::<Vec<_>>(),
        ),
    ])
}
