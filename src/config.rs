//! Sync configuration module
//!
//! Handles loading and parsing of session configuration from files and environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Session name shown in logs
    #[serde(default = "default_session_name")]
    pub session_name: String,

    /// Host transform batch flush interval in milliseconds
    #[serde(default = "default_transform_tick")]
    pub transform_tick_ms: u64,

    /// Capacity of each client's inbound event queue
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Visual construction timeout in milliseconds (0 to disable)
    #[serde(default = "default_spawn_timeout")]
    pub spawn_timeout_ms: u64,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,

    /// Loopback simulation settings
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Settings for the in-process loopback simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Probability that a transform message is lost
    #[serde(default = "default_drop_rate")]
    pub transform_drop_rate: f64,

    /// Probability that a transform message is swapped with the next one
    #[serde(default = "default_reorder_rate")]
    pub transform_reorder_rate: f64,

    /// RNG seed for loss/reorder decisions
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of player clients (a GM client always exists)
    #[serde(default = "default_players")]
    pub players: usize,

    /// Number of movement ticks to simulate
    #[serde(default = "default_ticks")]
    pub ticks: u64,
}

// Default value functions
fn default_session_name() -> String {
    "Tablesync".to_string()
}

fn default_transform_tick() -> u64 {
    50 // 20 transform batches per second
}

fn default_event_queue_capacity() -> usize {
    1024
}

fn default_spawn_timeout() -> u64 {
    10_000
}

fn default_drop_rate() -> f64 {
    0.1
}

fn default_reorder_rate() -> f64 {
    0.1
}

fn default_seed() -> u64 {
    42
}

fn default_players() -> usize {
    2
}

fn default_ticks() -> u64 {
    40
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            transform_drop_rate: default_drop_rate(),
            transform_reorder_rate: default_reorder_rate(),
            seed: default_seed(),
            players: default_players(),
            ticks: default_ticks(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/tablesync.toml"),
            session_name: default_session_name(),
            transform_tick_ms: default_transform_tick(),
            event_queue_capacity: default_event_queue_capacity(),
            spawn_timeout_ms: default_spawn_timeout(),
            debug: false,
            simulation: SimulationConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        let config_path = env::var("TABLESYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/tablesync.toml"));

        // Logging may not be set up yet; callers report a missing file
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            Self::from_toml(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Self::default()
        };

        config.config_path = config_path;

        config.apply_env_overrides();

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("TABLESYNC_SESSION_NAME") {
            self.session_name = val;
        }
        if let Ok(val) = env::var("TABLESYNC_TRANSFORM_TICK_MS") {
            if let Ok(ms) = val.parse() {
                self.transform_tick_ms = ms;
            }
        }
        if let Ok(val) = env::var("TABLESYNC_EVENT_QUEUE_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                self.event_queue_capacity = capacity;
            }
        }
        if let Ok(val) = env::var("TABLESYNC_SPAWN_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.spawn_timeout_ms = ms;
            }
        }
        if let Ok(val) = env::var("TABLESYNC_DEBUG") {
            self.debug = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = env::var("TABLESYNC_SIM_DROP_RATE") {
            if let Ok(rate) = val.parse() {
                self.simulation.transform_drop_rate = rate;
            }
        }
        if let Ok(val) = env::var("TABLESYNC_SIM_REORDER_RATE") {
            if let Ok(rate) = val.parse() {
                self.simulation.transform_reorder_rate = rate;
            }
        }
        if let Ok(val) = env::var("TABLESYNC_SIM_SEED") {
            if let Ok(seed) = val.parse() {
                self.simulation.seed = seed;
            }
        }
        if let Ok(val) = env::var("TABLESYNC_SIM_PLAYERS") {
            if let Ok(players) = val.parse() {
                self.simulation.players = players;
            }
        }
        if let Ok(val) = env::var("TABLESYNC_SIM_TICKS") {
            if let Ok(ticks) = val.parse() {
                self.simulation.ticks = ticks;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.transform_tick_ms < 10 || self.transform_tick_ms > 1000 {
            anyhow::bail!("Transform tick must be between 10ms and 1000ms");
        }

        if self.event_queue_capacity < 16 {
            anyhow::bail!("Event queue capacity must be at least 16");
        }

        let sim = &self.simulation;
        if !(0.0..=1.0).contains(&sim.transform_drop_rate) {
            anyhow::bail!("Transform drop rate must be between 0.0 and 1.0");
        }
        if !(0.0..=1.0).contains(&sim.transform_reorder_rate) {
            anyhow::bail!("Transform reorder rate must be between 0.0 and 1.0");
        }

        Ok(())
    }

    /// Transform batch flush interval
    pub fn transform_tick(&self) -> Duration {
        Duration::from_millis(self.transform_tick_ms)
    }

    /// Spawn timeout, if enabled
    pub fn spawn_timeout(&self) -> Option<Duration> {
        if self.spawn_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.spawn_timeout_ms))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.session_name, "Tablesync");
        assert_eq!(config.transform_tick_ms, 50);
        assert_eq!(config.event_queue_capacity, 1024);
        assert_eq!(config.spawn_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.simulation.players, 2);
    }

    #[test]
    fn test_partial_toml() {
        let config = SyncConfig::from_toml(
            r#"
            session_name = "Friday Night"
            spawn_timeout_ms = 0

            [simulation]
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.session_name, "Friday Night");
        assert_eq!(config.spawn_timeout(), None);
        assert_eq!(config.simulation.seed, 7);
        assert_eq!(config.simulation.ticks, 40);
        assert_eq!(config.transform_tick_ms, 50);
    }

    #[test]
    fn test_validation() {
        let mut config = SyncConfig::default();
        assert!(config.validate().is_ok());

        config.transform_tick_ms = 5;
        assert!(config.validate().is_err());
        config.transform_tick_ms = 50;

        config.event_queue_capacity = 4;
        assert!(config.validate().is_err());
        config.event_queue_capacity = 1024;

        config.simulation.transform_drop_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(SyncConfig::from_toml("transform_tick_ms = \"fast\"").is_err());
    }
}
