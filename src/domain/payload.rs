use serde::{Deserialize, Serialize};

/// How a declared diagnostic counter aggregates between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterKind {
    /// Reports the delta since the previous poll in the `Increment` field.
    Incrementing,
    /// Reports an average over the interval in the `Mean` field.
    Mean,
    /// Reports an instantaneous reading in the `Mean` field.
    Gauge,
}

impl CounterKind {
    pub fn wire_type(self) -> &'static str {
        match self {
            CounterKind::Incrementing => "Sum",
            CounterKind::Mean | CounterKind::Gauge => "Mean",
        }
    }
}

/// One counter sample as emitted by a diagnostic source for one polling round.
///
/// The counter name is shared by every cache using the same source type, so
/// the owning cache is only recoverable from `metadata` (`key:value,...`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiagnosticPayload {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub metadata: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub increment: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(default)]
    pub counter_type: String,
    #[serde(default)]
    pub interval_sec: f64,
}

impl DiagnosticPayload {
    /// Incrementing value when present, otherwise the mean/gauge reading.
    pub fn value(&self) -> Option<f64> {
        self.increment.or(self.mean)
    }
}
