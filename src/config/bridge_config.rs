//! Bridge configuration parsing from environment variables.

use super::parse_or;
use crate::application::bridge::default_measurement;
use anyhow::{Result, bail};
use std::time::Duration;
use tracing::warn;

/// Bridge environment configuration
#[derive(Debug, Clone)]
pub struct BridgeEnvConfig {
    pub application: String,
    pub application_version: String,
    pub measurement: String,
    pub polling_interval_secs: u64,
    pub discovery_interval_secs: u64,
    pub tracked_caches: Vec<String>,
}

impl Default for BridgeEnvConfig {
    fn default() -> Self {
        let application = "app".to_string();
        Self {
            measurement: default_measurement("dev", &application),
            application,
            application_version: env!("CARGO_PKG_VERSION").to_string(),
            polling_interval_secs: 5,
            discovery_interval_secs: 5,
            tracked_caches: vec!["email".to_string(), "domain".to_string()],
        }
    }
}

impl BridgeEnvConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let application = lookup("APP_NAME").unwrap_or(defaults.application);
        let application_version =
            lookup("APP_VERSION").unwrap_or(defaults.application_version);
        let prefix = lookup("METRICS_PREFIX").unwrap_or_else(|| "dev".to_string());
        let measurement = lookup("METRICS_MEASUREMENT")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| default_measurement(&prefix, &application));

        let polling_interval_secs = parse_or(lookup, "BRIDGE_POLL_INTERVAL_SECS", 5u64)?;
        let discovery_interval_secs = parse_or(lookup, "BRIDGE_DISCOVERY_INTERVAL_SECS", 5u64)?;
        if polling_interval_secs == 0 || discovery_interval_secs == 0 {
            bail!("Bridge intervals must be at least 1 second");
        }

        let tracked_caches = match lookup("BRIDGE_TRACKED_CACHES") {
            Some(raw) => {
                let mut caches: Vec<String> = Vec::new();
                for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    if caches.iter().any(|c| c == name) {
                        warn!("BRIDGE_TRACKED_CACHES lists {} more than once, ignoring repeat", name);
                        continue;
                    }
                    caches.push(name.to_string());
                }
                caches
            }
            None => defaults.tracked_caches,
        };
        if tracked_caches.is_empty() {
            bail!("BRIDGE_TRACKED_CACHES must name at least one cache");
        }

        Ok(Self {
            application,
            application_version,
            measurement,
            polling_interval_secs,
            discovery_interval_secs,
            tracked_caches,
        })
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_from_prefix_and_app() {
        let lookup = |key: &str| match key {
            "APP_NAME" => Some("mailer".to_string()),
            "METRICS_PREFIX" => Some("prod".to_string()),
            "BRIDGE_TRACKED_CACHES" => Some(" email , ,inbox".to_string()),
            _ => None,
        };
        let config = BridgeEnvConfig::from_lookup(&lookup).unwrap();
        assert_eq!(config.measurement, "prod_mailer_cache_events");
        assert_eq!(config.tracked_caches, vec!["email", "inbox"]);
    }

    #[test]
    fn test_repeated_tracked_caches_are_collapsed() {
        let lookup = |key: &str| {
            (key == "BRIDGE_TRACKED_CACHES").then(|| "email,domain,email, domain".to_string())
        };
        let config = BridgeEnvConfig::from_lookup(&lookup).unwrap();
        assert_eq!(config.tracked_caches, vec!["email", "domain"]);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let lookup = |key: &str| (key == "BRIDGE_POLL_INTERVAL_SECS").then(|| "0".to_string());
        assert!(BridgeEnvConfig::from_lookup(&lookup).is_err());
    }
}
