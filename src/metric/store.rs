//! Metric stores.
//!
//! - [`InMemoryMetricStore`]: process-local, lost on exit
//! - [`JsonLinesMetricStore`]: appends one JSON object per line to a file

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, RwLock};

use crate::metric::{Metric, MetricError, MetricFilter};

/// Persistence backend for metrics.
#[async_trait::async_trait]
pub trait MetricStore: Send + Sync + 'static {
    /// Persist `metric`, returning it with its assigned id.
    async fn create(&self, metric: Metric) -> Result<Metric, MetricError>;

    /// Return matching metrics in creation order.
    async fn query(&self, filter: &MetricFilter) -> Result<Vec<Metric>, MetricError>;
}

/// Metric store kept entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryMetricStore {
    metrics: RwLock<Vec<Metric>>,
}

impl InMemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored metrics.
    pub async fn len(&self) -> usize {
        self.metrics.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.metrics.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl MetricStore for InMemoryMetricStore {
    async fn create(&self, mut metric: Metric) -> Result<Metric, MetricError> {
        let mut metrics = self.metrics.write().await;
        metric.id = Some(metrics.len() as u64 + 1);
        metrics.push(metric.clone());
        Ok(metric)
    }

    async fn query(&self, filter: &MetricFilter) -> Result<Vec<Metric>, MetricError> {
        Ok(self
            .metrics
            .read()
            .await
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect())
    }
}

/// Metric store backed by a JSON-lines file.
///
/// Writes are serialized through one append handle; queries scan the file.
#[derive(Debug)]
pub struct JsonLinesMetricStore {
    path: PathBuf,
    file: Mutex<File>,
    next_id: AtomicU64,
}

impl JsonLinesMetricStore {
    /// Open (or create) the file at `path`, continuing ids after existing lines.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, MetricError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let existing = read_all(&path).await?;
        let last_id = existing.iter().filter_map(|m| m.id).max().unwrap_or(0);

        tracing::info!(path = %path.display(), existing = existing.len(), "Metric file opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
            next_id: AtomicU64::new(last_id + 1),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl MetricStore for JsonLinesMetricStore {
    async fn create(&self, mut metric: Metric) -> Result<Metric, MetricError> {
        let mut file = self.file.lock().await;
        metric.id = Some(self.next_id.fetch_add(1, Ordering::Relaxed));

        let mut line = serde_json::to_vec(&metric)?;
        line.push(b'\n');
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(metric)
    }

    async fn query(&self, filter: &MetricFilter) -> Result<Vec<Metric>, MetricError> {
        // Hold the writer lock so a half-written line is never read.
        let _guard = self.file.lock().await;
        Ok(read_all(&self.path)
            .await?
            .into_iter()
            .filter(|m| filter.matches(m))
            .collect())
    }
}

async fn read_all(path: &Path) -> Result<Vec<Metric>, MetricError> {
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut metrics = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        metrics.push(serde_json::from_str(&line)?);
    }
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn metric(name: &str, status_code: u16) -> Metric {
        Metric {
            id: None,
            name: name.to_string(),
            status_code,
            response_size_bytes: 7,
            response_time_ms: 1,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_assigns_ids_and_filters() {
        let store = InMemoryMetricStore::new();
        let since = Utc::now() - Duration::seconds(1);

        let a = store.create(metric("a", 200)).await.unwrap();
        let b = store.create(metric("b", 503)).await.unwrap();
        assert_eq!(a.id, Some(1));
        assert_eq!(b.id, Some(2));
        assert_eq!(store.len().await, 2);

        let found = store.query(&MetricFilter::new("b", since)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].status_code, 503);
    }

    #[tokio::test]
    async fn test_json_lines_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.jsonl");
        let since = Utc::now() - Duration::seconds(1);

        {
            let store = JsonLinesMetricStore::open(&path).await.unwrap();
            store.create(metric("api", 200)).await.unwrap();
            store.create(metric("web", 404)).await.unwrap();
        }

        let store = JsonLinesMetricStore::open(&path).await.unwrap();
        let third = store.create(metric("api", 500)).await.unwrap();
        assert_eq!(third.id, Some(3));

        let api = store.query(&MetricFilter::new("api", since)).await.unwrap();
        let codes: Vec<_> = api.iter().map(|m| m.status_code).collect();
        assert_eq!(codes, vec![200, 500]);
    }

    #[tokio::test]
    async fn test_json_lines_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();

        let err = JsonLinesMetricStore::open(&path).await.unwrap_err();
        assert!(matches!(err, MetricError::Json(_)));
    }
}
