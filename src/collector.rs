//! Wires a loaded configuration into a ready-to-start [`Scheduler`].

use crate::config::collector_config::CollectorConfig;
use crate::config::environment::{influx_settings_from_env, meteomatics_credentials_from_env};
use crate::config::error::ConfigError;
use crate::error::CollectorError;
use crate::pipeline::cycle_runner::CycleRunner;
use crate::pipeline::scheduler::{CycleHandler, Scheduler};
use crate::providers::meteomatics::MeteomaticsCredentials;
use crate::providers::registry::ProviderRegistry;
use crate::sink::adapter::Sink;
use crate::sink::influx::{InfluxSettings, InfluxSink};
use crate::sink::local_store::ParquetStore;
use crate::types::location::Location;
use crate::utils::ensure_data_dir_exists;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use log::{error, info, warn};
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;

/// Secrets and endpoints read from the environment.
#[derive(Debug, Clone, Default)]
pub struct CollectorEnvironment {
    /// Present whenever the config saves to the database.
    pub influx: Option<InfluxSettings>,
    pub meteomatics: Option<MeteomaticsCredentials>,
}

impl CollectorEnvironment {
    /// Reads what `config` needs from the process environment.
    pub fn from_env(config: &CollectorConfig) -> Result<Self, ConfigError> {
        let influx = if config.save_options.save_to_db {
            Some(influx_settings_from_env()?)
        } else {
            None
        };
        let meteomatics = meteomatics_credentials_from_env();
        config.check_credentials(meteomatics.as_ref())?;
        Ok(Self {
            influx,
            meteomatics,
        })
    }
}

/// Builds the registry, sinks and cycle runner, and schedules every
/// configured provider.
pub async fn build_scheduler(
    config: &CollectorConfig,
    environment: CollectorEnvironment,
    client: Client,
) -> Result<Scheduler, CollectorError> {
    let registry = Arc::new(ProviderRegistry::with_builtin_providers(
        client.clone(),
        environment.meteomatics,
    ));

    let sink = environment
        .influx
        .map(|settings| Arc::new(InfluxSink::new(client, settings)) as Arc<dyn Sink>);

    let local_store = if config.save_options.save_to_file {
        ensure_data_dir_exists(&config.data_dir).await?;
        Some(ParquetStore::new(&config.data_dir))
    } else {
        None
    };

    if sink.is_none() && local_store.is_none() {
        warn!("Neither save_to_db nor save_to_file is set, records will be discarded");
    }

    let runner = Arc::new(
        CycleRunner::builder()
            .registry(Arc::clone(&registry))
            .maybe_sink(sink)
            .maybe_local_store(local_store)
            .workers(config.workers)
            .build(),
    );

    let mut scheduler = Scheduler::new();
    for id in config.providers.keys() {
        registry.resolve(id)?;
        let Some(interval) = config.interval(id) else {
            continue;
        };
        let locations = Arc::new(config.locations_for(id));
        info!(
            "Collecting {} for {} location(s) every {:?}",
            id,
            locations.len(),
            interval
        );
        scheduler.schedule(id, interval, cycle_handler(&runner, id, locations));
    }
    Ok(scheduler)
}

/// Loads the config at `path`, reads the environment it needs and builds the
/// scheduler.
pub async fn scheduler_from_file(path: &Path, client: Client) -> Result<Scheduler, CollectorError> {
    let config = CollectorConfig::load(path).await?;
    let environment = CollectorEnvironment::from_env(&config)?;
    build_scheduler(&config, environment, client).await
}

fn cycle_handler(
    runner: &Arc<CycleRunner>,
    provider_id: &str,
    locations: Arc<Vec<Location>>,
) -> CycleHandler {
    let runner = Arc::clone(runner);
    let provider_id = provider_id.to_string();
    Arc::new(move |reference_time: DateTime<Utc>| {
        let runner = Arc::clone(&runner);
        let provider_id = provider_id.clone();
        let locations = Arc::clone(&locations);
        async move {
            if let Err(e) = runner
                .run_cycle(&provider_id, reference_time, &locations)
                .await
            {
                error!("Cycle of {} could not start: {}", provider_id, e);
            }
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::registry::RegistryError;
    use tempfile::TempDir;

    fn config(providers: &str, data_dir: &std::path::Path) -> Result<CollectorConfig, ConfigError> {
        CollectorConfig::from_json_str(&format!(
            r#"{{
                "providers": {providers},
                "locations": [ {{ "name": "SUPSI Mendrisio", "latitude": 45.87, "longitude": 8.98 }} ],
                "save_options": {{ "save_to_file": true, "save_to_db": false }},
                "data_dir": {}
            }}"#,
            serde_json::to_string(data_dir)?
        ))
    }

    #[tokio::test]
    async fn test_schedules_every_configured_provider() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let data_dir = dir.path().join("data");
        let config = config(r#"{"open-meteo": {"sampling_interval": 60}}"#, &data_dir)?;

        let scheduler =
            build_scheduler(&config, CollectorEnvironment::default(), Client::new()).await?;
        assert_eq!(scheduler.len(), 1);
        assert!(data_dir.is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_config_is_a_config_error() {
        let result =
            scheduler_from_file(Path::new("/definitely/not/here.json"), Client::new()).await;
        assert!(matches!(
            result,
            Err(CollectorError::Config(ConfigError::Read(..)))
        ));
    }

    #[tokio::test]
    async fn test_meteomatics_without_credentials_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let config = config(
            r#"{"meteomatics-hourly": {"sampling_interval": 60}}"#,
            dir.path(),
        )?;

        let result =
            build_scheduler(&config, CollectorEnvironment::default(), Client::new()).await;
        assert!(matches!(
            result,
            Err(CollectorError::Registry(RegistryError::UnknownProvider(id))) if id == "meteomatics-hourly"
        ));
        Ok(())
    }
}
