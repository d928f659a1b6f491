//! Scheduler owning the name → poller registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::scrape::poller::{Poller, PollerHandle, PollerState, current_runtime};
use crate::scrape::{HttpClient, HttpProberFactory, MeasurementStream, ProberFactory, ScrapeError};

/// Default timeout for graceful shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Metadata about a scheduled target.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    /// Generation id of the active poller.
    pub id: Uuid,
    /// Target name.
    pub name: String,
    /// Target URL.
    pub url: String,
    /// Scrape interval.
    pub interval: Duration,
    /// Current poller state.
    pub state: PollerState,
}

/// Registry of active pollers, keyed by target name.
///
/// The map lock is only held around lookup, insert and remove; each poller
/// runs in its own task and never touches the registry.
pub struct Scheduler {
    factory: Arc<dyn ProberFactory>,
    pollers: RwLock<HashMap<String, PollerHandle>>,
}

impl Scheduler {
    /// Create a scheduler that probes targets over HTTP with `client`.
    pub fn new(client: impl HttpClient) -> Self {
        Self::with_factory(HttpProberFactory::new(client))
    }

    /// Create a scheduler with a custom probe strategy.
    pub fn with_factory(factory: impl ProberFactory) -> Self {
        Self {
            factory: Arc::new(factory),
            pollers: RwLock::new(HashMap::new()),
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field(
                "target_count",
                &self.pollers.try_read().map(|p| p.len()).unwrap_or(0),
            )
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Start polling a new target.
    ///
    /// # Errors
    /// - `ScrapeError::DuplicateTarget` if `name` is already scheduled
    /// - `ScrapeError::InvalidInterval` if `interval` is zero
    /// - `ScrapeError::Spawn` if the poller task cannot be started
    pub async fn run(
        &self,
        name: &str,
        url: &str,
        interval: Duration,
    ) -> Result<MeasurementStream, ScrapeError> {
        let mut pollers = self.pollers.write().await;
        if pollers.contains_key(name) {
            tracing::warn!(target_name = %name, "Target already scheduled");
            return Err(ScrapeError::DuplicateTarget(name.to_string()));
        }

        let poller = self.build_poller(name, url, interval)?;
        let (handle, stream) = poller.start().inspect_err(|e| {
            tracing::error!(target_name = %name, error = %e, "Poller start failed")
        })?;
        let id = handle.info().id;
        pollers.insert(name.to_string(), handle);
        drop(pollers);

        tracing::info!(target_name = %name, url = %url, ?interval, id = %id, "Target scheduled");
        Ok(stream)
    }

    /// Replace the poller of an existing target.
    ///
    /// The old poller is told to stop before the new one is spawned, and its
    /// stream closes once its in-flight tick is done. The returned stream
    /// belongs to the new poller.
    ///
    /// # Errors
    /// - `ScrapeError::UnknownTarget` if `name` is not scheduled
    /// - `ScrapeError::InvalidInterval` / `ScrapeError::Spawn` as for [`run`](Self::run);
    ///   the existing poller is left untouched in that case
    pub async fn update(
        &self,
        name: &str,
        url: &str,
        interval: Duration,
    ) -> Result<MeasurementStream, ScrapeError> {
        let mut pollers = self.pollers.write().await;
        if !pollers.contains_key(name) {
            return Err(ScrapeError::UnknownTarget(name.to_string()));
        }

        // Everything that can fail happens before the old poller is touched.
        let poller = self.build_poller(name, url, interval)?;
        let runtime = current_runtime(name).inspect_err(|e| {
            tracing::error!(target_name = %name, error = %e, "Poller start failed")
        })?;

        if let Some(old) = pollers.remove(name) {
            old.stop();
            tracing::debug!(target_name = %name, old_id = %old.info().id, "Previous poller signalled");
        }
        let (handle, stream) = poller.start_on(&runtime);
        let id = handle.info().id;
        pollers.insert(name.to_string(), handle);
        drop(pollers);

        tracing::info!(target_name = %name, url = %url, ?interval, id = %id, "Target updated");
        Ok(stream)
    }

    /// Stop polling a target and forget it.
    ///
    /// Returns as soon as the stop signal is accepted; the stream closes once
    /// the poller finishes its in-flight tick.
    ///
    /// # Errors
    /// Returns `ScrapeError::UnknownTarget` if `name` is not scheduled.
    pub async fn stop(&self, name: &str) -> Result<(), ScrapeError> {
        let handle = self
            .pollers
            .write()
            .await
            .remove(name)
            .ok_or_else(|| ScrapeError::UnknownTarget(name.to_string()))?;

        handle.stop();
        tracing::info!(target_name = %name, id = %handle.info().id, "Target stopped");
        Ok(())
    }

    /// List all scheduled targets.
    pub async fn list_targets(&self) -> Vec<TargetInfo> {
        self.pollers
            .read()
            .await
            .values()
            .map(|handle| {
                let info = handle.info();
                TargetInfo {
                    id: info.id,
                    name: info.name.clone(),
                    url: info.url.clone(),
                    interval: info.interval,
                    state: handle.state(),
                }
            })
            .collect()
    }

    /// Get the number of scheduled targets.
    pub async fn target_count(&self) -> usize {
        self.pollers.read().await.len()
    }

    /// Whether a poller is registered under `name`.
    pub async fn contains(&self, name: &str) -> bool {
        self.pollers.read().await.contains_key(name)
    }

    /// Stop every poller and wait for them with the default timeout.
    pub async fn shutdown(&self) {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await;
    }

    /// Stop every poller and wait up to `timeout` for their tasks to exit.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> bool {
        let handles: Vec<_> = self.pollers.write().await.drain().collect();
        let target_count = handles.len();
        let tasks: Vec<_> = handles
            .into_iter()
            .map(|(_, handle)| handle.into_task())
            .collect();

        let joined = tokio::time::timeout(timeout, async {
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::error!(error = %e, "Poller task failed");
                }
            }
        })
        .await;

        match joined {
            Ok(()) => {
                tracing::info!(target_count, "Scheduler shutdown complete");
                true
            }
            Err(_) => {
                tracing::warn!(target_count, ?timeout, "Scheduler shutdown timed out");
                false
            }
        }
    }

    // --- Private helpers ---

    fn build_poller(&self, name: &str, url: &str, interval: Duration) -> Result<Poller, ScrapeError> {
        Poller::new(name, self.factory.prober(url), interval)
            .inspect_err(|e| tracing::warn!(target_name = %name, error = %e, "Invalid poller"))
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for handle in self.pollers.get_mut().values() {
            handle.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::{Measurement, ProbeError, Prober};
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;
    use tokio::time::{Instant, timeout};

    /// Prober that reports its URL length as the body size.
    struct EchoProber {
        url: String,
    }

    #[async_trait::async_trait]
    impl Prober for EchoProber {
        fn url(&self) -> &str {
            &self.url
        }

        async fn probe(&self) -> Result<Measurement, ProbeError> {
            Ok(Measurement {
                status_code: 200,
                response_size_bytes: self.url.len() as u64,
                response_time_ms: 0,
                created_at: Utc::now(),
            })
        }
    }

    fn echo_scheduler() -> Scheduler {
        Scheduler::with_factory(|url: &str| -> Arc<dyn Prober> {
            Arc::new(EchoProber {
                url: url.to_string(),
            })
        })
    }

    async fn next(stream: &mut MeasurementStream) -> Option<Measurement> {
        timeout(Duration::from_secs(2), stream.recv())
            .await
            .expect("stream did not produce or close in time")
    }

    #[tokio::test]
    async fn test_run_twice_is_duplicate() {
        let scheduler = echo_scheduler();
        let _stream = scheduler
            .run("api", "http://a", Duration::from_secs(60))
            .await
            .unwrap();

        let err = scheduler
            .run("api", "http://b", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::DuplicateTarget(name) if name == "api"));
        assert_eq!(scheduler.target_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_and_stop_unknown_target() {
        let scheduler = echo_scheduler();

        let err = scheduler
            .update("ghost", "http://a", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::UnknownTarget(_)));

        let err = scheduler.stop("ghost").await.unwrap_err();
        assert!(matches!(err, ScrapeError::UnknownTarget(_)));
        assert_eq!(scheduler.target_count().await, 0);
    }

    #[tokio::test]
    async fn test_zero_interval_has_no_side_effect() {
        let scheduler = echo_scheduler();
        let err = scheduler
            .run("api", "http://a", Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidInterval(_)));
        assert!(!scheduler.contains("api").await);

        let mut stream = scheduler
            .run("api", "http://a", Duration::from_millis(10))
            .await
            .unwrap();
        let err = scheduler
            .update("api", "http://b", Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidInterval(_)));

        // The original poller keeps running.
        assert!(next(&mut stream).await.is_some());
    }

    #[tokio::test]
    async fn test_ticks_follow_interval() {
        let scheduler = echo_scheduler();
        let started = Instant::now();
        let mut stream = scheduler
            .run("api", "http://a", Duration::from_millis(50))
            .await
            .unwrap();

        for _ in 0..3 {
            assert!(next(&mut stream).await.is_some());
        }
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(140), "too fast: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "too slow: {elapsed:?}");
    }

    #[tokio::test]
    async fn test_stop_closes_stream_and_removes_entry() {
        let scheduler = echo_scheduler();
        let mut stream = scheduler
            .run("api", "http://a", Duration::from_millis(10))
            .await
            .unwrap();
        assert!(next(&mut stream).await.is_some());

        scheduler.stop("api").await.unwrap();
        assert!(!scheduler.contains("api").await);
        assert!(next(&mut stream).await.is_none());

        // The name is free again.
        scheduler
            .run("api", "http://a", Duration::from_secs(60))
            .await
            .unwrap();
    }

    /// Receive `count` measurements and return the time between the first
    /// and the last one.
    async fn spacing(stream: &mut MeasurementStream, count: u32) -> Duration {
        assert!(next(stream).await.is_some());
        let first = Instant::now();
        for _ in 1..count {
            assert!(next(stream).await.is_some());
        }
        first.elapsed()
    }

    #[tokio::test]
    async fn test_update_returns_new_stream() {
        let scheduler = echo_scheduler();
        let mut old = scheduler
            .run("api", "http://a", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(next(&mut old).await.unwrap().response_size_bytes, 8);

        let mut new = scheduler
            .update("api", "http://longer", Duration::from_millis(20))
            .await
            .unwrap();
        assert_ne!(old.id(), new.id());

        // The old poller was signalled before update returned.
        assert_ne!(old.state(), PollerState::Running);
        assert!(next(&mut old).await.is_none());
        assert_eq!(next(&mut new).await.unwrap().response_size_bytes, 13);

        let targets = scheduler.list_targets().await;
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, new.id());
        assert_eq!(targets[0].url, "http://longer");
        assert_eq!(targets[0].interval, Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_update_ticks_at_new_interval() {
        let scheduler = echo_scheduler();
        let mut old = scheduler
            .run("api", "http://a", Duration::from_millis(10))
            .await
            .unwrap();
        let fast = spacing(&mut old, 4).await;
        assert!(fast < Duration::from_millis(150), "old interval too slow: {fast:?}");

        let mut new = scheduler
            .update("api", "http://a", Duration::from_millis(60))
            .await
            .unwrap();
        assert!(next(&mut old).await.is_none());

        // Three gaps of 60ms each.
        let slow = spacing(&mut new, 4).await;
        assert!(slow >= Duration::from_millis(170), "new interval not applied: {slow:?}");
        assert!(slow < Duration::from_secs(1), "too slow: {slow:?}");
    }

    /// Prober that blocks until released, so a stop can land mid-call.
    struct GatedProber {
        entered: Arc<Notify>,
        release: Arc<Notify>,
        finished: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl Prober for GatedProber {
        fn url(&self) -> &str {
            "mock://gated"
        }

        async fn probe(&self) -> Result<Measurement, ProbeError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(Measurement {
                status_code: 200,
                response_size_bytes: 0,
                response_time_ms: 0,
                created_at: Utc::now(),
            })
        }
    }

    #[tokio::test]
    async fn test_stop_mid_probe_delivers_nothing() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let finished = Arc::new(AtomicBool::new(false));

        let factory = {
            let (entered, release, finished) =
                (Arc::clone(&entered), Arc::clone(&release), Arc::clone(&finished));
            move |_: &str| -> Arc<dyn Prober> {
                Arc::new(GatedProber {
                    entered: Arc::clone(&entered),
                    release: Arc::clone(&release),
                    finished: Arc::clone(&finished),
                })
            }
        };
        let scheduler = Scheduler::with_factory(factory);
        let mut stream = scheduler
            .run("slow", "mock://gated", Duration::from_millis(10))
            .await
            .unwrap();

        timeout(Duration::from_secs(2), entered.notified())
            .await
            .expect("probe never started");
        scheduler.stop("slow").await.unwrap();

        // The stream stays open until the in-flight probe returns.
        assert!(
            timeout(Duration::from_millis(50), stream.recv())
                .await
                .is_err()
        );

        release.notify_one();
        assert!(next(&mut stream).await.is_none());
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let scheduler = echo_scheduler();
        let (a, b) = tokio::join!(
            scheduler.run("a", "http://a", Duration::from_millis(20)),
            scheduler.run("b", "http://bb", Duration::from_millis(30)),
        );
        let (mut a, mut b) = (a.unwrap(), b.unwrap());

        for _ in 0..3 {
            assert_eq!(next(&mut a).await.unwrap().response_size_bytes, 8);
        }
        // b was never drained while a ticked; it still delivers.
        assert_eq!(next(&mut b).await.unwrap().response_size_bytes, 9);
        assert_eq!(scheduler.target_count().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_streams_keep_their_own_interval() {
        let scheduler = echo_scheduler();
        let (fast, slow) = tokio::join!(
            scheduler.run("fast", "http://a", Duration::from_millis(20)),
            scheduler.run("slow", "http://bb", Duration::from_millis(70)),
        );
        let (mut fast, mut slow) = (fast.unwrap(), slow.unwrap());

        let (fast_gap, slow_gap) = tokio::join!(spacing(&mut fast, 6), spacing(&mut slow, 3));

        // Five gaps of 20ms and two gaps of 70ms.
        assert!(fast_gap >= Duration::from_millis(90), "fast stream too fast: {fast_gap:?}");
        assert!(fast_gap < Duration::from_millis(250), "fast stream slowed down: {fast_gap:?}");
        assert!(slow_gap >= Duration::from_millis(130), "slow stream too fast: {slow_gap:?}");
        assert!(slow_gap < Duration::from_secs(1), "slow stream too slow: {slow_gap:?}");
    }

    #[tokio::test]
    async fn test_shutdown_closes_all_streams() {
        let scheduler = echo_scheduler();
        let mut a = scheduler
            .run("a", "http://a", Duration::from_secs(60))
            .await
            .unwrap();
        let mut b = scheduler
            .run("b", "http://b", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(scheduler.shutdown_with_timeout(Duration::from_secs(1)).await);
        assert_eq!(scheduler.target_count().await, 0);
        assert!(next(&mut a).await.is_none());
        assert!(next(&mut b).await.is_none());
    }

    #[tokio::test]
    async fn test_drop_stops_pollers() {
        let scheduler = echo_scheduler();
        let mut stream = scheduler
            .run("a", "http://a", Duration::from_secs(60))
            .await
            .unwrap();
        drop(scheduler);
        assert!(next(&mut stream).await.is_none());
    }
}
