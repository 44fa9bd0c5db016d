//! Pipeline configuration: the recognized tuning knobs for OCR, the
//! resolver, perception, the stability waiter, and retention, loaded
//! from a TOML file under the platform config directory the same way
//! this project has always resolved its config path.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub min_confidence: f64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self { min_confidence: 0.4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub min_threshold: f64,
    pub runner_up_margin: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_threshold: 25.0,
            runner_up_margin: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionConfig {
    pub caption_enabled: bool,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            caption_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityWaiterConfig {
    pub timeout_s: f64,
    pub threshold: f64,
    pub interval_s: f64,
    pub consecutive_stable: u32,
}

impl Default for StabilityWaiterConfig {
    fn default() -> Self {
        Self {
            timeout_s: 10.0,
            threshold: 0.99,
            interval_s: 0.3,
            consecutive_stable: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotsConfig {
    pub max_age_days: u32,
    pub max_count: usize,
}

impl Default for ScreenshotsConfig {
    fn default() -> Self {
        Self {
            max_age_days: 1,
            max_count: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub max_age_days: u32,
    pub max_count: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_age_days: 30,
            max_count: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    pub ocr: OcrConfig,
    pub resolver: ResolverConfig,
    pub perception: PerceptionConfig,
    pub stability_waiter: StabilityWaiterConfig,
    pub screenshots: ScreenshotsConfig,
    pub history: HistoryConfig,
}

/// Loads and saves `PipelineConfig` from the platform config directory.
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Self {
        let path = directories::ProjectDirs::from("dev", "deskpilot", "deskpilot")
            .map(|p| p.config_dir().join("pipeline.toml"))
            .unwrap_or_else(|| PathBuf::from(".deskpilot/pipeline.toml"));
        Self { path }
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads the config, falling back to defaults if the file does not exist.
    pub fn load(&self) -> Result<PipelineConfig, ConfigError> {
        if !self.path.exists() {
            return Ok(PipelineConfig::default());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn save(&self, config: &PipelineConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(config)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_expected_values() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.resolver.min_threshold, 25.0);
        assert_eq!(cfg.resolver.runner_up_margin, 10.0);
        assert_eq!(cfg.stability_waiter.consecutive_stable, 3);
        assert_eq!(cfg.history.max_count, 1000);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = PipelineConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("pipeline.toml"));
        manager.save(&cfg).unwrap();
        let loaded = manager.load().unwrap();
        assert_eq!(loaded.ocr.min_confidence, cfg.ocr.min_confidence);
    }
}
