//! Application configuration
//!
//! Loaded from a camelCase JSON file. Missing fields take their defaults, so
//! an empty object is a valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::camera::Resolution;
use crate::effects::EffectSettings;
use crate::error::ConfigError;
use crate::ml::ModelConfig;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// Preferred capture resolution (advisory)
    pub resolution: Resolution,

    /// Render loop frame rate (24-240)
    pub target_fps: u32,

    /// Segmentation model loading
    pub model: ModelConfig,

    /// Effect settings at startup
    pub settings: EffectSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            target_fps: 60,
            model: ModelConfig::default(),
            settings: EffectSettings::default(),
        }
    }
}

impl AppConfig {
    /// Clamp FPS to valid range (24-240)
    pub fn clamp_fps(&mut self) {
        self.target_fps = self.target_fps.clamp(24, 240);
    }

    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(json)?;
        config.clamp_fps();

        // Ensure sane minimums.
        config.resolution.width = config.resolution.width.max(1);
        config.resolution.height = config.resolution.height.max(1);

        Ok(config)
    }

    /// Load from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}
