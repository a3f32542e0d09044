use crate::domain::errors::BackendError;
use crate::domain::metric_point::Tags;
use crate::domain::ports::MetricsBackend;
use tracing::{Level, event};

/// Console backend: every increment becomes a structured `tracing` event.
#[derive(Debug, Clone)]
pub struct LoggingBackend {
    level: Level,
}

impl LoggingBackend {
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    fn format_tags(tags: &Tags) -> String {
        tags.iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for LoggingBackend {
    fn default() -> Self {
        Self::new(Level::DEBUG)
    }
}

// `event!` needs a constant level.
macro_rules! emit_at {
    ($level:expr, $($arg:tt)+) => {
        let level = $level;
        if level == Level::ERROR {
            event!(Level::ERROR, $($arg)+)
        } else if level == Level::WARN {
            event!(Level::WARN, $($arg)+)
        } else if level == Level::INFO {
            event!(Level::INFO, $($arg)+)
        } else if level == Level::DEBUG {
            event!(Level::DEBUG, $($arg)+)
        } else {
            event!(Level::TRACE, $($arg)+)
        }
    };
}

impl MetricsBackend for LoggingBackend {
    fn increment_counter(&self, name: &str, tags: &Tags) -> Result<(), BackendError> {
        emit_at!(self.level, counter = name, tags = %Self::format_tags(tags), "cache counter +1");
        Ok(())
    }

    fn set_gauge(&self, name: &str, tags: &Tags, value: u64) -> Result<(), BackendError> {
        emit_at!(self.level, gauge = name, value, tags = %Self::format_tags(tags), "cache gauge");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_backend_never_fails() {
        let backend = LoggingBackend::new(Level::INFO);
        let mut tags = Tags::new();
        tags.insert("cacheName".to_string(), "email".to_string());
        assert!(backend.increment_counter("hit", &tags).is_ok());
        assert!(backend.set_gauge("item_count", &tags, 3).is_ok());
        assert_eq!(LoggingBackend::format_tags(&tags), "cacheName=email");
    }
}
