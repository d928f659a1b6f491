//! Target service.
//!
//! Owns the set of configured targets and keeps the [`Scheduler`] in step
//! with it: creating a target starts a poller and a consumer task, updating
//! replaces both, deleting stops the poller.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;

use crate::metric::MetricService;
use crate::scrape::{MeasurementStream, Scheduler, ScrapeError};

/// Default scrape interval (30 seconds).
pub const DEFAULT_SCRAPE_INTERVAL: Duration = Duration::from_secs(30);

fn default_interval() -> Duration {
    DEFAULT_SCRAPE_INTERVAL
}

/// Errors returned by [`TargetService`].
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("target '{0}' already exists")]
    AlreadyExists(String),

    #[error("target '{0}' not found")]
    NotFound(String),

    #[error("invalid target: {0}")]
    Invalid(String),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),
}

/// A named URL scraped at a fixed interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Unique name.
    pub name: String,
    /// HTTP or HTTPS URL.
    pub url: String,
    /// Scrape interval (default: 30s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
}

impl Target {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            interval: DEFAULT_SCRAPE_INTERVAL,
        }
    }

    /// Set the scrape interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Check name, URL and interval.
    pub fn validate(&self) -> Result<(), TargetError> {
        if self.name.trim().is_empty() {
            return Err(TargetError::Invalid("name cannot be empty".to_string()));
        }
        let url = url::Url::parse(&self.url).map_err(|e| {
            TargetError::Invalid(format!("'{}': invalid URL '{}': {}", self.name, self.url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TargetError::Invalid(format!(
                "'{}': unsupported scheme '{}'",
                self.name,
                url.scheme()
            )));
        }
        if self.interval.is_zero() {
            return Err(TargetError::Invalid(format!(
                "'{}': interval must be greater than zero",
                self.name
            )));
        }
        Ok(())
    }
}

/// Keeps targets, pollers and consumers in sync.
pub struct TargetService {
    targets: RwLock<BTreeMap<String, Target>>,
    scheduler: Arc<Scheduler>,
    metrics: MetricService,
    consumers: Mutex<JoinSet<usize>>,
}

impl TargetService {
    pub fn new(scheduler: Arc<Scheduler>, metrics: MetricService) -> Self {
        Self {
            targets: RwLock::new(BTreeMap::new()),
            scheduler,
            metrics,
            consumers: Mutex::new(JoinSet::new()),
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn metrics(&self) -> &MetricService {
        &self.metrics
    }

    /// Register a target and start scraping it.
    pub async fn create(&self, target: Target) -> Result<Target, TargetError> {
        target.validate()?;

        let mut targets = self.targets.write().await;
        if targets.contains_key(&target.name) {
            return Err(TargetError::AlreadyExists(target.name));
        }
        let stream = self
            .scheduler
            .run(&target.name, &target.url, target.interval)
            .await?;
        targets.insert(target.name.clone(), target.clone());
        drop(targets);

        self.attach_consumer(stream).await;
        tracing::info!(target_name = %target.name, url = %target.url, "Target created");
        Ok(target)
    }

    /// Change the URL or interval of an existing target.
    pub async fn update(&self, target: Target) -> Result<Target, TargetError> {
        target.validate()?;

        let mut targets = self.targets.write().await;
        if !targets.contains_key(&target.name) {
            return Err(TargetError::NotFound(target.name));
        }
        let stream = self
            .scheduler
            .update(&target.name, &target.url, target.interval)
            .await?;
        targets.insert(target.name.clone(), target.clone());
        drop(targets);

        self.attach_consumer(stream).await;
        tracing::info!(target_name = %target.name, url = %target.url, "Target updated");
        Ok(target)
    }

    /// Remove a target and stop scraping it.
    pub async fn delete(&self, name: &str) -> Result<Target, TargetError> {
        let target = self
            .targets
            .write()
            .await
            .remove(name)
            .ok_or_else(|| TargetError::NotFound(name.to_string()))?;

        if let Err(e) = self.scheduler.stop(name).await {
            // Poller already gone: nothing left to stop.
            tracing::warn!(target_name = %name, error = %e, "Stop failed during delete");
        }
        tracing::info!(target_name = %name, "Target deleted");
        Ok(target)
    }

    pub async fn get(&self, name: &str) -> Result<Target, TargetError> {
        self.targets
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| TargetError::NotFound(name.to_string()))
    }

    /// All targets ordered by name.
    pub async fn list(&self) -> Vec<Target> {
        self.targets.read().await.values().cloned().collect()
    }

    /// Stop every poller, then wait up to `timeout` for consumers to drain.
    pub async fn shutdown(&self, timeout: Duration) {
        self.scheduler.shutdown_with_timeout(timeout).await;

        let mut consumers = self.consumers.lock().await;
        let drained = tokio::time::timeout(timeout, async {
            let mut stored = 0;
            while let Some(joined) = consumers.join_next().await {
                match joined {
                    Ok(n) => stored += n,
                    Err(e) => tracing::error!(error = %e, "Consumer task failed"),
                }
            }
            stored
        })
        .await;

        match drained {
            Ok(stored) => tracing::info!(stored, "Consumers drained"),
            Err(_) => {
                tracing::warn!("Consumers did not drain in time");
                consumers.abort_all();
            }
        }
    }

    async fn attach_consumer(&self, stream: MeasurementStream) {
        let metrics = self.metrics.clone();
        let mut consumers = self.consumers.lock().await;
        // Reap consumers whose streams have already closed.
        while consumers.try_join_next().is_some() {}
        consumers.spawn(async move { metrics.consume(stream).await });
    }
}

impl std::fmt::Debug for TargetService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetService")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
