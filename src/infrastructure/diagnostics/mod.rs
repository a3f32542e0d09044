pub mod counter_source;
pub mod registry;

pub use counter_source::DiagnosticCounterSource;
pub use registry::DiagnosticsRegistry;
