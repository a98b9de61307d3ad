//! Defines the temporal resolution of provider requests and the per-fetch
//! request value handed to fetchers and normalizers.

use crate::types::location::Location;
use chrono::{DateTime, Utc};
use std::fmt;

/// Temporal resolution of a provider's forecast rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// One row every five minutes (nowcasting).
    FiveMinutes,
    /// One row per hour.
    OneHour,
}

impl Resolution {
    /// Token used in provider column names and in file names, e.g. `5min`.
    pub fn token(&self) -> &'static str {
        match self {
            Resolution::FiveMinutes => "5min",
            Resolution::OneHour => "1h",
        }
    }

    /// ISO-8601 period, e.g. `PT5M`.
    pub fn iso_period(&self) -> &'static str {
        match self {
            Resolution::FiveMinutes => "PT5M",
            Resolution::OneHour => "PT1H",
        }
    }

    /// Parses a column/file token back into a resolution.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "5min" => Some(Resolution::FiveMinutes),
            "1h" => Some(Resolution::OneHour),
            _ => None,
        }
    }
}

/// Formats a `Resolution` using its token.
///
/// # Examples
///
/// ```
/// use ensemble_collector::Resolution;
///
/// assert_eq!(Resolution::FiveMinutes.to_string(), "5min");
/// assert_eq!(format!("{}", Resolution::OneHour), "1h");
/// ```
impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// One provider request for one location and model within a cycle.
///
/// The reference time is shared by every request of the same cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    pub location: Location,
    pub reference_time: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub resolution: Resolution,
}

impl ForecastRequest {
    /// Midnight (UTC) of the reference day, the start of day-aligned requests.
    pub fn reference_midnight(&self) -> DateTime<Utc> {
        self.reference_time
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(self.reference_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolution_token_roundtrip() {
        for resolution in [Resolution::FiveMinutes, Resolution::OneHour] {
            assert_eq!(Resolution::from_token(resolution.token()), Some(resolution));
        }
        assert_eq!(Resolution::from_token("15min"), None);
    }

    #[test]
    fn test_reference_midnight() {
        let request = ForecastRequest {
            location: Location::new("Lugano", 46.0, 8.95),
            reference_time: Utc.with_ymd_and_hms(2024, 3, 5, 13, 45, 0).unwrap(),
            provider: "open-meteo".to_string(),
            model: "icon_seamless".to_string(),
            resolution: Resolution::OneHour,
        };
        assert_eq!(
            request.reference_midnight(),
            Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()
        );
    }
}
