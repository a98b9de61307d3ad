//! Lookup tables mapping provider signal names to canonical `name:unit`
//! strings, with explicit per-resolution unit conversions.

use crate::normalize::error::NormalizeError;
use crate::types::forecast_request::Resolution;
use std::collections::HashMap;

/// How a provider reports a signal's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    /// Value stands on its own (temperature, wind speed, precipitation sum).
    Instantaneous,
    /// Energy accumulated over the row's interval (Wh), stored as average
    /// power (W/m²).
    EnergyPerInterval,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    pub canonical: String,
    pub quantity: Quantity,
}

/// Provider signal name → canonical signal, built once at startup.
#[derive(Debug, Clone)]
pub struct SignalTable {
    provider: String,
    signals: HashMap<String, SignalSpec>,
    energy_factors: Vec<(Resolution, f64)>,
}

impl SignalTable {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            signals: HashMap::new(),
            energy_factors: Vec::new(),
        }
    }

    pub fn signal(mut self, source: &str, canonical: &str, quantity: Quantity) -> Self {
        self.signals.insert(
            source.to_string(),
            SignalSpec {
                canonical: canonical.to_string(),
                quantity,
            },
        );
        self
    }

    /// Declares the factor turning an energy-per-interval value at
    /// `resolution` into average power. Resolutions without a declaration
    /// are rejected at normalization time.
    pub fn energy_factor(mut self, resolution: Resolution, factor: f64) -> Self {
        self.energy_factors.retain(|(r, _)| *r != resolution);
        self.energy_factors.push((resolution, factor));
        self
    }

    pub fn lookup(&self, source: &str) -> Result<&SignalSpec, NormalizeError> {
        self.signals
            .get(source)
            .ok_or_else(|| NormalizeError::UnknownSignal {
                provider: self.provider.clone(),
                signal: source.to_string(),
            })
    }

    /// Multiplier applied to every value of `spec` at `resolution`.
    pub fn factor(&self, spec: &SignalSpec, resolution: Resolution) -> Result<f64, NormalizeError> {
        match spec.quantity {
            Quantity::Instantaneous => Ok(1.0),
            Quantity::EnergyPerInterval => self
                .energy_factors
                .iter()
                .find(|(r, _)| *r == resolution)
                .map(|(_, factor)| *factor)
                .ok_or_else(|| NormalizeError::UndeclaredConversion {
                    signal: spec.canonical.clone(),
                    resolution,
                }),
        }
    }
}
