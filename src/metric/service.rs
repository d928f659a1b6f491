//! Metric service: drains measurement streams into a store.

use std::sync::Arc;

use crate::metric::{Metric, MetricError, MetricFilter, MetricStore};
use crate::scrape::MeasurementStream;

/// Consumes measurement streams and answers metric queries.
#[derive(Clone)]
pub struct MetricService {
    store: Arc<dyn MetricStore>,
}

impl MetricService {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self { store }
    }

    /// Metrics matching `filter`, oldest first.
    pub async fn get(&self, filter: &MetricFilter) -> Result<Vec<Metric>, MetricError> {
        self.store.query(filter).await
    }

    /// Persist every measurement from `stream` until it closes.
    ///
    /// Store failures are logged and the measurement is dropped; they never
    /// reach the scheduler.
    pub async fn consume(&self, mut stream: MeasurementStream) -> usize {
        let name = stream.name().to_string();
        let generation = stream.id();
        tracing::debug!(target_name = %name, id = %generation, "Consumer attached");

        let mut stored = 0;
        while let Some(measurement) = stream.recv().await {
            let metric = Metric::from_measurement(&name, measurement);
            match self.store.create(metric).await {
                Ok(m) => {
                    stored += 1;
                    tracing::debug!(
                        target_name = %name,
                        status = m.status_code,
                        bytes = m.response_size_bytes,
                        latency_ms = m.response_time_ms,
                        "Metric stored"
                    );
                }
                Err(e) => {
                    tracing::error!(target_name = %name, error = %e, "Failed to store metric");
                }
            }
        }

        tracing::debug!(target_name = %name, id = %generation, stored, "Stream closed");
        stored
    }
}

impl std::fmt::Debug for MetricService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricService").finish_non_exhaustive()
    }
}
