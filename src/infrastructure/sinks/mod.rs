//! [`crate::domain::ports::MetricsSink`] implementations.

pub mod console;
pub mod influx;
pub mod line_protocol;
pub mod memory;

pub use console::ConsoleSink;
pub use influx::{InfluxSink, InfluxSinkConfig};
pub use memory::MemorySink;
