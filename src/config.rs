// src/config.rs

//! Manages process-level configuration: loading the TOML file, applying defaults
//! and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Connection defaults used when neither the URL nor the caller overrides set a value.
/// They mirror the defaults of the cluster driver.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DriverDefaults {
    /// The native protocol port used when the URL carries none.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    pub read_timeout: Duration,
    #[serde(default = "default_true")]
    pub tcp_no_delay: bool,
    #[serde(default = "default_true")]
    pub keep_alive: bool,
}

impl Default for DriverDefaults {
    fn default() -> Self {
        Self {
            port: default_port(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            tcp_no_delay: true,
            keep_alive: true,
        }
    }
}

fn default_port() -> u16 {
    9042
}
fn default_connect_timeout() -> Duration {
    Duration::from_millis(5000)
}
fn default_read_timeout() -> Duration {
    Duration::from_millis(12000)
}
fn default_true() -> bool {
    true
}

/// Configuration for the Prometheus metrics exposition.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MetricsConfig {
    /// If true, the probe dumps the gathered metrics after a run.
    #[serde(default)]
    pub enabled: bool,
}

/// Top-level configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub defaults: DriverDefaults,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            defaults: DriverDefaults::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file and validates it.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.defaults.port == 0 {
            return Err(anyhow!("defaults.port must be a non-zero port number"));
        }
        if self.defaults.connect_timeout.is_zero() {
            return Err(anyhow!("defaults.connect_timeout must be greater than zero"));
        }
        if self.defaults.read_timeout.is_zero() {
            return Err(anyhow!("defaults.read_timeout must be greater than zero"));
        }
        Ok(())
    }
}
