//! Settings taken from environment variables (optionally via a `.env` file).

use crate::config::error::ConfigError;
use crate::providers::meteomatics::MeteomaticsCredentials;
use crate::sink::influx::InfluxSettings;

pub const INFLUX_URL: &str = "INFLUX_URL";
pub const INFLUX_TOKEN: &str = "INFLUX_TOKEN";
pub const INFLUX_ORG: &str = "INFLUX_ORG";
pub const INFLUX_BUCKET: &str = "INFLUX_BUCKET";
pub const METEOMATICS_USER: &str = "METEOMATICS_USER";
pub const METEOMATICS_PWD: &str = "METEOMATICS_PWD";

/// Loads a `.env` file from the working directory when there is one.
/// Returns whether a file was found.
pub fn load_dotenv() -> bool {
    dotenvy::dotenv().is_ok()
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String, ConfigError> {
    lookup(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnv(name.to_string()))
}

pub fn influx_settings_from_env() -> Result<InfluxSettings, ConfigError> {
    influx_settings_with(process_env)
}

pub fn meteomatics_credentials_from_env() -> Option<MeteomaticsCredentials> {
    meteomatics_credentials_with(process_env)
}

pub(crate) fn influx_settings_with(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<InfluxSettings, ConfigError> {
    Ok(InfluxSettings {
        url: required(&lookup, INFLUX_URL)?,
        token: required(&lookup, INFLUX_TOKEN)?,
        org: required(&lookup, INFLUX_ORG)?,
        bucket: required(&lookup, INFLUX_BUCKET)?,
    })
}

/// Both variables must be present; a half-configured account counts as none.
pub(crate) fn meteomatics_credentials_with(
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<MeteomaticsCredentials> {
    Some(MeteomaticsCredentials {
        username: required(&lookup, METEOMATICS_USER).ok()?,
        password: required(&lookup, METEOMATICS_PWD).ok()?,
    })
}
