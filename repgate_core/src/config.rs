//! Configuration file support for Repgate.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/repgate/config.toml`.

use crate::{Error, ExerciseDefinition, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default = "default_exercises")]
    pub exercises: Vec<ExerciseDefinition>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            detector: DetectorConfig::default(),
            coordinator: CoordinatorConfig::default(),
            exercises: default_exercises(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Pose classification and debounce thresholds
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DetectorConfig {
    /// Landmarks below this visibility are treated as unavailable
    #[serde(default = "default_min_visibility")]
    pub min_visibility: f32,

    /// How far above the shoulder line a wrist must be to count as raised
    #[serde(default = "default_wrist_margin")]
    pub wrist_margin: f32,

    /// Ankle spread must exceed this multiple of hip width for legs apart
    #[serde(default = "default_ankle_spread_ratio")]
    pub ankle_spread_ratio: f32,

    /// Minimum time between accepted posture changes
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_visibility: default_min_visibility(),
            wrist_margin: default_wrist_margin(),
            ankle_spread_ratio: default_ankle_spread_ratio(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl DetectorConfig {
    pub fn debounce(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.debounce_ms as i64)
    }
}

/// Observer fan-out configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Notifications an observer may fall behind before it starts missing them
    #[serde(default = "default_observer_capacity")]
    pub observer_capacity: usize,

    /// How often a watching process checks for commits made by other processes
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            observer_capacity: default_observer_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl CoordinatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(std::env::temp_dir);
    base.join("repgate")
}

fn default_min_visibility() -> f32 {
    0.5
}

fn default_wrist_margin() -> f32 {
    0.05
}

fn default_ankle_spread_ratio() -> f32 {
    1.5
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_observer_capacity() -> usize {
    64
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_exercises() -> Vec<ExerciseDefinition> {
    vec![ExerciseDefinition {
        name: "jumping_jacks".into(),
        display_name: "Jumping Jacks".into(),
        reps_required: 20,
        credits_awarded: 1,
    }]
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject thresholds that would make detection meaningless
    pub fn validate(&self) -> Result<()> {
        let d = &self.detector;
        if !(0.0..=1.0).contains(&d.min_visibility) {
            return Err(Error::Config(format!(
                "detector.min_visibility must be within [0, 1], got {}",
                d.min_visibility
            )));
        }
        if !d.wrist_margin.is_finite() || d.wrist_margin < 0.0 {
            return Err(Error::Config(format!(
                "detector.wrist_margin must be non-negative, got {}",
                d.wrist_margin
            )));
        }
        if !d.ankle_spread_ratio.is_finite() || d.ankle_spread_ratio <= 0.0 {
            return Err(Error::Config(format!(
                "detector.ankle_spread_ratio must be positive, got {}",
                d.ankle_spread_ratio
            )));
        }
        if self.coordinator.observer_capacity == 0 {
            return Err(Error::Config(
                "coordinator.observer_capacity must be at least 1".into(),
            ));
        }
        if self.coordinator.poll_interval_ms == 0 {
            return Err(Error::Config(
                "coordinator.poll_interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(std::env::temp_dir);
        base.join("repgate").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
