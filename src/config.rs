//! Engine Configuration
//!
//! Tunables for the tick loop, near-end cues and on-disk persistence.
//! Loaded from an optional YAML file; every field has a default.
//!
//! ```yaml
//! tick_interval_ms: 250
//! beep_start_seconds: 3
//! data_dir: /home/me/.boutrunner
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Lazily-resolved default data directory (`$HOME/.boutrunner`).
pub static DEFAULT_DATA_DIR: Lazy<PathBuf> = Lazy::new(|| {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    let dir = PathBuf::from(home).join(".boutrunner");
    debug!("Default data directory: {}", dir.display());
    dir
});

fn default_tick_interval_ms() -> u64 {
    250
}

fn default_beep_start_seconds() -> u32 {
    3
}

fn default_data_dir() -> PathBuf {
    DEFAULT_DATA_DIR.clone()
}

/// Runtime configuration for a session driver.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Interval between clock ticks
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Seconds before a timed target at which near-end cues start
    #[serde(default = "default_beep_start_seconds")]
    pub beep_start_seconds: u32,

    /// Where execution records are written
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            beep_start_seconds: default_beep_start_seconds(),
            data_dir: default_data_dir(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&content)?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads configuration if the file exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            debug!("No configuration at {}, using defaults", path.as_ref().display());
            Ok(Self::default())
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Directory holding execution records.
    pub fn executions_dir(&self) -> PathBuf {
        self.data_dir.join("executions")
    }
}
