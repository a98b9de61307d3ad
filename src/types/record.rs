//! The tidy, long-format record emitted by normalizers, and its grouping into
//! per-signal write batches.

use crate::types::location::SeriesTags;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Member id used when a provider reports no ensemble spread.
pub const MEAN_MEMBER: &str = "mean";

/// One forecast value of one signal for one ensemble member.
///
/// `step` is the signed number of seconds from `reference_time` to the
/// forecast's valid time. `signal` carries its canonical unit suffix, e.g.
/// `diffuse_radiation:W/m²`. A missing provider value is stored as NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub reference_time: DateTime<Utc>,
    pub step: i64,
    pub signal: String,
    pub model: String,
    pub member: String,
    pub value: f64,
    pub tags: Arc<SeriesTags>,
}

impl NormalizedRecord {
    pub fn valid_time(&self) -> DateTime<Utc> {
        self.reference_time + chrono::Duration::seconds(self.step)
    }
}

/// All records of one signal, written to the store in a single call.
///
/// The store keeps one field column per signal, so batches never mix signals.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    pub measurement: String,
    pub signal: String,
    pub tag_columns: &'static [&'static str],
    pub records: Vec<NormalizedRecord>,
}

impl WriteBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Splits a record set into one batch per signal.
///
/// Batches come out sorted by signal name; records keep their relative order
/// inside each batch.
pub fn group_by_signal(
    records: Vec<NormalizedRecord>,
    measurement: &str,
    tag_columns: &'static [&'static str],
) -> Vec<WriteBatch> {
    let mut grouped: BTreeMap<String, Vec<NormalizedRecord>> = BTreeMap::new();
    for record in records {
        grouped.entry(record.signal.clone()).or_default().push(record);
    }

    grouped
        .into_iter()
        .map(|(signal, records)| WriteBatch {
            measurement: measurement.to_string(),
            signal,
            tag_columns,
            records,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(signal: &str, step: i64, value: f64) -> NormalizedRecord {
        NormalizedRecord {
            reference_time: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            step,
            signal: signal.to_string(),
            model: "icon_seamless".to_string(),
            member: MEAN_MEMBER.to_string(),
            value,
            tags: Arc::new(SeriesTags {
                location: "Lugano".to_string(),
                latitude: 46.0,
                longitude: 8.95,
                elevation: None,
            }),
        }
    }

    #[test]
    fn test_group_by_signal_splits_and_keeps_order() {
        let records = vec![
            record("temperature_2m:°C", 0, 21.0),
            record("precipitation:mm", 0, 0.0),
            record("temperature_2m:°C", 3600, 22.5),
        ];

        let batches = group_by_signal(records, "open-meteo", &["location"]);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].signal, "precipitation:mm");
        assert_eq!(batches[1].signal, "temperature_2m:°C");
        assert_eq!(batches[1].measurement, "open-meteo");
        let steps: Vec<i64> = batches[1].records.iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![0, 3600]);
    }

    #[test]
    fn test_valid_time_adds_step() {
        let r = record("precipitation:mm", -300, 0.1);
        assert_eq!(
            r.valid_time(),
            Utc.with_ymd_and_hms(2024, 6, 1, 11, 55, 0).unwrap()
        );
    }
}
