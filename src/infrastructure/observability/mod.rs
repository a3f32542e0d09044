//! Push-path metrics backends.
//!
//! Each backend implements [`crate::domain::ports::MetricsBackend`] once; the
//! observer never branches on which one it is feeding.

pub mod logging_backend;
pub mod prometheus_backend;

pub use logging_backend::LoggingBackend;
pub use prometheus_backend::PrometheusBackend;
