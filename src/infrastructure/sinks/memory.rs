use crate::domain::errors::SinkError;
use crate::domain::metric_point::{Destination, MetricPoint};
use crate::domain::ports::MetricsSink;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Keeps every batch in memory. Can be told to fail for resilience checks.
#[derive(Default)]
pub struct MemorySink {
    batches: Mutex<Vec<(Destination, Vec<MetricPoint>)>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<(Destination, Vec<MetricPoint>)> {
        self.batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    pub fn points(&self) -> Vec<MetricPoint> {
        self.batches()
            .into_iter()
            .flat_map(|(_, points)| points)
            .collect()
    }
}

#[async_trait]
impl MetricsSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write(
        &self,
        points: &[MetricPoint],
        destination: &Destination,
    ) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable {
                reason: "memory sink set to fail".to_string(),
            });
        }
        let mut batches = self.batches.lock().map_err(|_| SinkError::Unavailable {
            reason: "memory sink poisoned".to_string(),
        })?;
        batches.push((destination.clone(), points.to_vec()));
        Ok(())
    }
}
