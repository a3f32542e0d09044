use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag set attached to a metric. Ordered so encoders produce stable output.
pub type Tags = BTreeMap<String, String>;

/// One fully-tagged sample ready for a [`crate::domain::ports::MetricsSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricPoint {
    measurement: String,
    value: i64,
    tags: Tags,
    timestamp: DateTime<Utc>,
}

impl MetricPoint {
    /// Build a point. The timestamp is truncated to whole seconds.
    pub fn new(
        measurement: impl Into<String>,
        value: i64,
        tags: Tags,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            value,
            tags,
            timestamp: timestamp.trunc_subsecs(0),
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// The `value` field.
    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Where a sink should deliver a batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Destination {
    /// The sink's own configured target.
    #[default]
    Default,
    /// A cloud-style bucket owned by an organization.
    Cloud { bucket: String, organization: String },
}

impl Destination {
    /// Cloud routing only applies when both halves are present.
    pub fn from_parts(bucket: Option<String>, organization: Option<String>) -> Self {
        match (bucket, organization) {
            (Some(bucket), Some(organization)) if !bucket.is_empty() && !organization.is_empty() => {
                Destination::Cloud {
                    bucket,
                    organization,
                }
            }
            _ => Destination::Default,
        }
    }
}

/// Bookkeeping for a diagnostic source the bridge has seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRegistration {
    pub source_name: String,
    pub poll_interval_seconds: u64,
    pub enabled: bool,
}
