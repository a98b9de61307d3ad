//! Explicit mapping from provider id to its fetcher/normalizer pair.

use crate::fetch::fetcher::Fetcher;
use crate::normalize::normalizer::Normalizer;
use crate::providers::meteomatics::{
    MeteomaticsCredentials, MeteomaticsFetcher, MeteomaticsNormalizer, HOURLY_PROVIDER_ID,
    NOWCASTING_PROVIDER_ID,
};
use crate::providers::open_meteo::{self, OpenMeteoFetcher, OpenMeteoNormalizer};
use crate::types::forecast_request::Resolution;
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),
}

/// The capability pair registered for one provider id.
#[derive(Clone)]
pub struct Provider {
    pub id: String,
    pub fetcher: Arc<dyn Fetcher>,
    pub normalizer: Arc<dyn Normalizer>,
}

/// Lookup table of providers. Adding a data source means registering one
/// more pair here; nothing else changes.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Provider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in provider. Meteomatics providers are only
    /// added when credentials are available.
    pub fn with_builtin_providers(
        client: Client,
        meteomatics: Option<MeteomaticsCredentials>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(
            open_meteo::PROVIDER_ID,
            Arc::new(OpenMeteoFetcher::new(client.clone())),
            Arc::new(OpenMeteoNormalizer::new()),
        );

        if let Some(credentials) = meteomatics {
            for (id, resolution) in [
                (NOWCASTING_PROVIDER_ID, Resolution::FiveMinutes),
                (HOURLY_PROVIDER_ID, Resolution::OneHour),
            ] {
                registry.register(
                    id,
                    Arc::new(MeteomaticsFetcher::new(
                        client.clone(),
                        credentials.clone(),
                        resolution,
                    )),
                    Arc::new(MeteomaticsNormalizer::new(id, resolution)),
                );
            }
        }
        registry
    }

    /// Registers (or replaces) the pair for `id`.
    pub fn register(
        &mut self,
        id: &str,
        fetcher: Arc<dyn Fetcher>,
        normalizer: Arc<dyn Normalizer>,
    ) -> &mut Self {
        self.providers.insert(
            id.to_string(),
            Provider {
                id: id.to_string(),
                fetcher,
                normalizer,
            },
        );
        self
    }

    pub fn resolve(&self, id: &str) -> Result<Provider, RegistryError> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownProvider(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

/// Ids of every provider this crate knows how to build.
pub fn builtin_provider_ids() -> [&'static str; 3] {
    [
        open_meteo::PROVIDER_ID,
        NOWCASTING_PROVIDER_ID,
        HOURLY_PROVIDER_ID,
    ]
}

/// Whether a provider id needs Meteomatics credentials.
pub fn requires_meteomatics_credentials(id: &str) -> bool {
    id == NOWCASTING_PROVIDER_ID || id == HOURLY_PROVIDER_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_without_credentials() {
        let registry = ProviderRegistry::with_builtin_providers(Client::new(), None);

        assert!(registry.contains("open-meteo"));
        assert!(!registry.contains("meteomatics-hourly"));
        assert_eq!(
            registry.resolve("meteomatics-hourly").err(),
            Some(RegistryError::UnknownProvider("meteomatics-hourly".to_string()))
        );
    }

    #[test]
    fn test_builtin_registry_with_credentials() -> Result<(), RegistryError> {
        let credentials = MeteomaticsCredentials {
            username: "user".to_string(),
            password: "secret".to_string(),
        };
        let registry = ProviderRegistry::with_builtin_providers(Client::new(), Some(credentials));

        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(ids, vec!["meteomatics-hourly", "meteomatics-nowcasting", "open-meteo"]);

        let nowcasting = registry.resolve("meteomatics-nowcasting")?;
        assert_eq!(nowcasting.fetcher.resolution(), Resolution::FiveMinutes);
        assert_eq!(nowcasting.normalizer.measurement(), "meteomatics_5min");
        assert_eq!(nowcasting.fetcher.models().len(), 3);
        Ok(())
    }
}
