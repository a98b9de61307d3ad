//! The JSON configuration file, loaded once at startup.

use crate::config::error::ConfigError;
use crate::providers::meteomatics::MeteomaticsCredentials;
use crate::providers::registry::{builtin_provider_ids, requires_meteomatics_credentials};
use crate::types::location::Location;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_DATA_DIR: &str = "data";

/// Longest accepted sampling interval, one year.
pub const MAX_SAMPLING_INTERVAL_MINUTES: u64 = 365 * 24 * 60;

fn minutes_to_duration(minutes: u64) -> Option<Duration> {
    minutes
        .checked_mul(60)
        .filter(|_| minutes <= MAX_SAMPLING_INTERVAL_MINUTES)
        .map(Duration::from_secs)
}

/// Per-provider scheduling settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderConfig {
    /// Minutes between two cycles.
    pub sampling_interval: u64,
    /// Names of the locations this provider collects; all when absent.
    #[serde(default)]
    pub locations: Option<Vec<String>>,
}

/// Where normalized records go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    pub save_to_file: bool,
    pub save_to_db: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            save_to_file: false,
            save_to_db: true,
        }
    }
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

/// Parsed and validated collector configuration.
///
/// ```
/// use ensemble_collector::CollectorConfig;
///
/// let config = CollectorConfig::from_json_str(r#"{
///     "providers": { "open-meteo": { "sampling_interval": 60 } },
///     "locations": [ { "name": "SUPSI Mendrisio", "latitude": 45.8683146, "longitude": 8.9767214 } ]
/// }"#)?;
/// assert_eq!(config.workers, 4);
/// assert!(config.save_options.save_to_db);
/// # Ok::<(), ensemble_collector::config::error::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CollectorConfig {
    pub providers: BTreeMap<String, ProviderConfig>,
    pub locations: Vec<Location>,
    #[serde(default)]
    pub save_options: SaveOptions,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl CollectorConfig {
    /// Reads, parses and validates the file at `path`.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let config: CollectorConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that do not depend on the environment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        if self.locations.is_empty() {
            return Err(ConfigError::NoLocations);
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }

        let mut names = HashSet::new();
        for location in &self.locations {
            if !names.insert(location.name.as_str()) {
                return Err(ConfigError::DuplicateLocation(location.name.clone()));
            }
        }

        let known = builtin_provider_ids();
        for (id, provider) in &self.providers {
            if !known.contains(&id.as_str()) {
                return Err(ConfigError::UnknownProvider(id.clone()));
            }
            if provider.sampling_interval == 0 {
                return Err(ConfigError::ZeroInterval(id.clone()));
            }
            if minutes_to_duration(provider.sampling_interval).is_none() {
                return Err(ConfigError::IntervalTooLarge(id.clone()));
            }
            if let Some(selected) = &provider.locations {
                if selected.is_empty() {
                    return Err(ConfigError::EmptyProviderLocations {
                        provider: id.clone(),
                    });
                }
                if let Some(missing) = selected.iter().find(|name| !names.contains(name.as_str())) {
                    return Err(ConfigError::UnknownLocation {
                        provider: id.clone(),
                        location: missing.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Fails when a configured provider needs credentials that are absent.
    pub fn check_credentials(
        &self,
        meteomatics: Option<&MeteomaticsCredentials>,
    ) -> Result<(), ConfigError> {
        match self
            .providers
            .keys()
            .find(|id| requires_meteomatics_credentials(id))
        {
            Some(id) if meteomatics.is_none() => {
                Err(ConfigError::MissingMeteomaticsCredentials(id.clone()))
            }
            _ => Ok(()),
        }
    }

    pub fn interval(&self, provider_id: &str) -> Option<Duration> {
        self.providers
            .get(provider_id)
            .and_then(|p| minutes_to_duration(p.sampling_interval))
    }

    /// Locations collected by `provider_id`, in configuration order.
    pub fn locations_for(&self, provider_id: &str) -> Vec<Location> {
        match self
            .providers
            .get(provider_id)
            .and_then(|p| p.locations.as_ref())
        {
            Some(selected) => self
                .locations
                .iter()
                .filter(|location| selected.contains(&location.name))
                .cloned()
                .collect(),
            None => self.locations.clone(),
        }
    }
}
