use crate::domain::errors::SinkError;
use crate::domain::metric_point::{Destination, MetricPoint};
use crate::domain::ports::MetricsSink;
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;

#[derive(Serialize)]
struct ConsoleBatch<'a> {
    destination: String,
    count: usize,
    points: &'a [MetricPoint],
}

/// Writes each batch as one `METRICS_JSON:` line so it can be filtered from logs.
pub struct ConsoleSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::stdout()
    }
}

#[async_trait]
impl MetricsSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn write(
        &self,
        points: &[MetricPoint],
        destination: &Destination,
    ) -> Result<(), SinkError> {
        let destination = match destination {
            Destination::Default => "default".to_string(),
            Destination::Cloud {
                bucket,
                organization,
            } => format!("{}/{}", organization, bucket),
        };
        let json = serde_json::to_string(&ConsoleBatch {
            destination,
            count: points.len(),
            points,
        })?;

        let mut writer = self.writer.lock().map_err(|_| SinkError::Unavailable {
            reason: "console writer poisoned".to_string(),
        })?;
        writeln!(writer, "METRICS_JSON:{}", json)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metric_point::Tags;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_writes_prefixed_json_line() {
        let buffer = SharedBuffer::default();
        let sink = ConsoleSink::new(Box::new(buffer.clone()));
        let mut tags = Tags::new();
        tags.insert("cacheName".to_string(), "email".to_string());
        let point = MetricPoint::new("m", 3, tags, chrono::Utc::now());

        sink.write(&[point], &Destination::Default).await.unwrap();

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(output.starts_with("METRICS_JSON:"));
        assert!(output.contains("\"count\":1"));
        assert!(output.contains("email"));
    }
}
