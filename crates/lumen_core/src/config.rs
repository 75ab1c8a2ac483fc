use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{MAX_FRAMES_IN_FLIGHT, MAX_LIGHTS_PER_TILE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Tunables for light management and tile culling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    /// Number of frames the GPU may have in flight. One dirty bit per frame.
    pub frames_in_flight: usize,
    /// Edge length of a square culling tile, in pixels.
    pub tile_size: u32,
    pub max_lights_per_tile: u32,
    /// Cullable light capacity allocated the first time a light set is synced.
    pub initial_cullable_capacity: u32,
    /// Over-allocation applied when the cullable light buffers grow.
    pub growth_factor: f32,
    /// Field-of-view changes smaller than this don't rebuild the frustum grid.
    pub fov_epsilon: f32,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            tile_size: 16,
            max_lights_per_tile: 256,
            initial_cullable_capacity: 32,
            growth_factor: 1.5,
            fov_epsilon: 1e-4,
        }
    }
}

impl LightingConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        log::info!("loaded lighting config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(ConfigError::Invalid {
                field: "frames_in_flight",
                reason: format!(
                    "{} is outside 1..={MAX_FRAMES_IN_FLIGHT}",
                    self.frames_in_flight
                ),
            });
        }
        if self.tile_size == 0 {
            return Err(ConfigError::Invalid {
                field: "tile_size",
                reason: "must be non-zero".into(),
            });
        }
        if !(1..=MAX_LIGHTS_PER_TILE).contains(&self.max_lights_per_tile) {
            return Err(ConfigError::Invalid {
                field: "max_lights_per_tile",
                reason: format!(
                    "{} is outside 1..={MAX_LIGHTS_PER_TILE}",
                    self.max_lights_per_tile
                ),
            });
        }
        if !(self.growth_factor >= 1.0) {
            return Err(ConfigError::Invalid {
                field: "growth_factor",
                reason: format!("{} is below 1.0", self.growth_factor),
            });
        }
        if !(self.fov_epsilon >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "fov_epsilon",
                reason: format!("{} is negative", self.fov_epsilon),
            });
        }
        Ok(())
    }
}
