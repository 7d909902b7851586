use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SysdashError;

/// Validity windows, caps and sampling intervals.
///
/// Durations are stored in milliseconds so the JSON stays readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub process_cache_ms: u64,
    pub connection_cache_ms: u64,
    pub hardware_cache_ms: u64,
    pub details_cache_ms: u64,
    pub process_traffic_cache_ms: u64,
    pub max_processes: usize,
    pub max_connections: usize,
    pub max_services: usize,
    pub system_interval_ms: u64,
    pub traffic_interval_ms: u64,
    /// Wait for a replaced fetch to return before starting its successor
    pub join_replaced: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            process_cache_ms: 2_000,
            connection_cache_ms: 3_000,
            hardware_cache_ms: 30_000,
            details_cache_ms: 60_000,
            process_traffic_cache_ms: 3_000,
            max_processes: 200,
            max_connections: 500,
            max_services: 100,
            system_interval_ms: 2_000,
            traffic_interval_ms: 1_000,
            join_replaced: false,
        }
    }
}

impl MonitorConfig {
    /// Load from the default location; a missing or empty file gives the
    /// defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = if data.trim().is_empty() {
            Self::default()
        } else {
            serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let data = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, data).with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().with_context(|| "Could not determine config directory")?;

        Ok(config_dir.join("sysdash").join("config.json"))
    }

    /// Reject zero windows, caps and intervals.
    pub fn validate(&self) -> crate::error::Result<()> {
        let durations = [
            ("process_cache_ms", self.process_cache_ms),
            ("connection_cache_ms", self.connection_cache_ms),
            ("hardware_cache_ms", self.hardware_cache_ms),
            ("details_cache_ms", self.details_cache_ms),
            ("process_traffic_cache_ms", self.process_traffic_cache_ms),
            ("system_interval_ms", self.system_interval_ms),
            ("traffic_interval_ms", self.traffic_interval_ms),
        ];
        let caps = [
            ("max_processes", self.max_processes),
            ("max_connections", self.max_connections),
            ("max_services", self.max_services),
        ];

        if let Some((name, _)) = durations.iter().find(|(_, v)| *v == 0) {
            return Err(SysdashError::config(format!("{} must be greater than 0", name)));
        }
        if let Some((name, _)) = caps.iter().find(|(_, v)| *v == 0) {
            return Err(SysdashError::config(format!("{} must be greater than 0", name)));
        }
        Ok(())
    }

    pub fn process_cache(&self) -> Duration {
        Duration::from_millis(self.process_cache_ms)
    }

    pub fn connection_cache(&self) -> Duration {
        Duration::from_millis(self.connection_cache_ms)
    }

    pub fn hardware_cache(&self) -> Duration {
        Duration::from_millis(self.hardware_cache_ms)
    }

    pub fn details_cache(&self) -> Duration {
        Duration::from_millis(self.details_cache_ms)
    }

    pub fn process_traffic_cache(&self) -> Duration {
        Duration::from_millis(self.process_traffic_cache_ms)
    }

    pub fn system_interval(&self) -> Duration {
        Duration::from_millis(self.system_interval_ms)
    }

    pub fn traffic_interval(&self) -> Duration {
        Duration::from_millis(self.traffic_interval_ms)
    }
}
