// Canonical tag names and values
pub mod conventions;

// Lifecycle events emitted by the observed cache
pub mod events;

// Metric points, tags and sink destinations
pub mod metric_point;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;

// Wire format of polled diagnostic counters
pub mod payload;
