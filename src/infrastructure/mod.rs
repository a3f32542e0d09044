pub mod cache;
pub mod core;
pub mod diagnostics;
pub mod observability;
pub mod sinks;

pub use cache::InMemoryCache;
pub use diagnostics::{DiagnosticCounterSource, DiagnosticsRegistry};
pub use observability::{LoggingBackend, PrometheusBackend};
pub use sinks::{ConsoleSink, InfluxSink, MemorySink};
