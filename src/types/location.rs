//! Geographic locations the collector pulls forecasts for, and the tag set
//! derived from them for every stored series.

use serde::{Deserialize, Serialize};

/// A named point of interest, supplied by configuration.
///
/// Locations are loaded once at startup and never change afterwards. The
/// `name` is unique within a configuration and doubles as the `location` tag
/// of every stored series.
///
/// # Examples
///
/// ```
/// use ensemble_collector::Location;
///
/// let supsi = Location::new("SUPSI Mendrisio", 45.8683146, 8.9767214);
/// assert_eq!(supsi.name, "SUPSI Mendrisio");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Unique label, e.g. "SUPSI Mendrisio".
    pub name: String,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

impl Location {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }

    /// Name usable inside a file name (spaces replaced by underscores).
    pub fn file_safe_name(&self) -> String {
        self.name.replace(' ', "_")
    }
}

/// The location-derived part of a record's tag set.
///
/// Providers may report the coordinates of the model grid cell rather than
/// the requested point, and some report an elevation; both end up here.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesTags {
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
}

impl SeriesTags {
    /// Tags built straight from the configured location.
    pub fn from_location(location: &Location) -> Self {
        Self {
            location: location.name.clone(),
            latitude: location.latitude,
            longitude: location.longitude,
            elevation: None,
        }
    }
}
