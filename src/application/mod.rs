pub mod bridge;
pub mod observer;

pub use bridge::{BridgeHandle, BridgeSettings, MetricsBridge};
pub use observer::{CacheEventObserver, ObserverOptions};
