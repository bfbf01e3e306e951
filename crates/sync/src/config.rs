use std::path::Path;

use serde::Deserialize;

use crate::delta::CodecConfig;
use crate::error::ConfigError;
use crate::movement::{MovementConfig, ValidatorConfig};
use crate::net::DEFAULT_TICK_RATE;
use crate::prediction::PredictionConfig;
use crate::snapshot::{DEFAULT_STORE_CAPACITY, InterpolationConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Ticks of history kept per entity.
    pub capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_STORE_CAPACITY,
        }
    }
}

/// Settings shared by the server shard and client sessions. Both ends must
/// agree on `tick_rate`, `codec` and `movement`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub tick_rate: u32,
    pub codec: CodecConfig,
    pub store: StoreConfig,
    pub movement: MovementConfig,
    pub validator: ValidatorConfig,
    pub prediction: PredictionConfig,
    pub interpolation: InterpolationConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            codec: CodecConfig::default(),
            store: StoreConfig::default(),
            movement: MovementConfig::default(),
            validator: ValidatorConfig::default(),
            prediction: PredictionConfig::default(),
            interpolation: InterpolationConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Simulation step in seconds.
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    pub fn tick_ms(&self) -> f64 {
        1000.0 / self.tick_rate.max(1) as f64
    }
}
