//! Configuration module for the cache metrics bridge.
//!
//! Everything is loaded from environment variables, grouped by concern:
//! the bridge itself and the sink it writes to.

mod bridge_config;
mod sink_config;

pub use bridge_config::BridgeEnvConfig;
pub use sink_config::{SinkEnvConfig, SinkKind};

use crate::application::bridge::BridgeSettings;
use anyhow::{Context, Result};
use std::env;

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bridge: BridgeEnvConfig,
    pub sink: SinkEnvConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bridge = BridgeEnvConfig::from_lookup(&lookup).context("Failed to load bridge config")?;
        let sink = SinkEnvConfig::from_lookup(&lookup).context("Failed to load sink config")?;
        Ok(Self { bridge, sink })
    }

    /// Settings for [`crate::application::MetricsBridge`].
    pub fn bridge_settings(&self) -> BridgeSettings {
        let mut settings = BridgeSettings::new(
            self.bridge.application.clone(),
            self.bridge.application_version.clone(),
        );
        settings.measurement = self.bridge.measurement.clone();
        settings.tracked_sources = self.bridge.tracked_caches.clone();
        settings.polling_interval = self.bridge.polling_interval();
        settings.discovery_interval = self.bridge.discovery_interval();
        settings.destination = self.sink.destination();
        settings
    }
}

/// Read and parse an optional variable, falling back to `default` when unset.
pub(crate) fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {}={}: {}", key, raw, e)),
        None => Ok(default),
    }
}
