use std::path::PathBuf;
use thiserror::Error;

/// Problems found while loading configuration. All of them stop the
/// collector at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No providers configured")]
    NoProviders,

    #[error("Unknown provider '{0}' in config")]
    UnknownProvider(String),

    #[error("Provider '{0}' has a sampling interval of zero")]
    ZeroInterval(String),

    #[error("Provider '{0}' has a sampling interval too large to schedule")]
    IntervalTooLarge(String),

    #[error("Worker count must be at least 1")]
    ZeroWorkers,

    #[error("No locations configured")]
    NoLocations,

    #[error("Location '{0}' is configured more than once")]
    DuplicateLocation(String),

    #[error("Provider '{provider}' refers to unknown location '{location}'")]
    UnknownLocation { provider: String, location: String },

    #[error("Provider '{provider}' selects an empty location list")]
    EmptyProviderLocations { provider: String },

    #[error("Environment variable {0} is not set")]
    MissingEnv(String),

    #[error("Provider '{0}' needs METEOMATICS_USER and METEOMATICS_PWD")]
    MissingMeteomaticsCredentials(String),
}
