//! Sink configuration parsing from environment variables.

use super::parse_or;
use crate::domain::metric_point::Destination;
use anyhow::{Result, bail};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Console,
    Influx,
}

impl FromStr for SinkKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" => Ok(SinkKind::Console),
            "influx" | "influxdb" => Ok(SinkKind::Influx),
            _ => bail!("Invalid SINK_KIND: {}. Must be 'console' or 'influx'", s),
        }
    }
}

/// Sink environment configuration
#[derive(Debug, Clone)]
pub struct SinkEnvConfig {
    pub kind: SinkKind,
    pub influx_url: String,
    pub influx_database: String,
    pub influx_token: Option<String>,
    pub influx_bucket: Option<String>,
    pub influx_org: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SinkEnvConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::Console,
            influx_url: "http://localhost:8086".to_string(),
            influx_database: "cache_metrics".to_string(),
            influx_token: None,
            influx_bucket: None,
            influx_org: None,
            timeout_secs: 10,
        }
    }
}

impl SinkEnvConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            kind: parse_or(lookup, "SINK_KIND", defaults.kind)?,
            influx_url: lookup("INFLUX_URL").unwrap_or(defaults.influx_url),
            influx_database: lookup("INFLUX_DATABASE").unwrap_or(defaults.influx_database),
            influx_token: lookup("INFLUX_TOKEN"),
            influx_bucket: lookup("INFLUX_BUCKET"),
            influx_org: lookup("INFLUX_ORG"),
            timeout_secs: parse_or(lookup, "INFLUX_TIMEOUT_SECS", defaults.timeout_secs)?,
        })
    }

    /// Cloud routing when both bucket and organization are configured.
    pub fn destination(&self) -> Destination {
        Destination::from_parts(self.influx_bucket.clone(), self.influx_org.clone())
    }
}
