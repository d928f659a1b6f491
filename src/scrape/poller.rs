//! Per-target polling loop.
//!
//! A [`Poller`] owns one prober and a fixed interval. Once started it runs in
//! its own task and hands each successful measurement to its
//! [`MeasurementStream`] until it is told to stop. The handoff is a
//! rendezvous: after a send the loop waits until the consumer has taken the
//! value before it waits for the next tick, so an undrained stream stalls the
//! poller. The sending half never leaves the task, so the stream closes
//! exactly when the loop exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::scrape::{Measurement, Prober, ScrapeError};

/// Lifecycle of a poller. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for PollerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Ordered sequence of measurements produced by one poller generation.
#[derive(Debug)]
pub struct MeasurementStream {
    id: Uuid,
    name: String,
    rx: mpsc::Receiver<Measurement>,
    token: CancellationToken,
    state: watch::Receiver<PollerState>,
}

impl MeasurementStream {
    /// Generation id, shared with the poller that feeds this stream.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Target name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state of the poller feeding this stream.
    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    /// Receive the next measurement, or `None` once the poller has stopped.
    ///
    /// A measurement still waiting for pickup when the poller was told to
    /// stop is discarded.
    pub async fn recv(&mut self) -> Option<Measurement> {
        loop {
            let measurement = self.rx.recv().await?;
            if !self.token.is_cancelled() {
                return Some(measurement);
            }
        }
    }
}

/// A poller that has not been started yet.
pub struct Poller {
    id: Uuid,
    name: String,
    interval: Duration,
    prober: Arc<dyn Prober>,
}

impl Poller {
    /// Create a poller in the `Created` state.
    ///
    /// # Errors
    /// Returns `ScrapeError::InvalidInterval` if `interval` is zero.
    pub fn new(
        name: impl Into<String>,
        prober: Arc<dyn Prober>,
        interval: Duration,
    ) -> Result<Self, ScrapeError> {
        let name = name.into();
        if interval.is_zero() {
            return Err(ScrapeError::InvalidInterval(name));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            interval,
            prober,
        })
    }

    /// Spawn the polling task on the current runtime.
    ///
    /// # Errors
    /// Returns `ScrapeError::Spawn` when called outside a Tokio runtime.
    pub fn start(self) -> Result<(PollerHandle, MeasurementStream), ScrapeError> {
        let runtime = current_runtime(&self.name)?;
        Ok(self.start_on(&runtime))
    }

    /// Spawn the polling task on `runtime`.
    pub fn start_on(self, runtime: &Handle) -> (PollerHandle, MeasurementStream) {
        // One slot: the loop waits for it to drain again after every send.
        let (tx, rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(PollerState::Created);
        let state = Arc::new(state_tx);
        let token = CancellationToken::new();

        let handle_info = PollerInfo {
            id: self.id,
            name: self.name.clone(),
            url: self.prober.url().to_string(),
            interval: self.interval,
        };
        let stream = MeasurementStream {
            id: self.id,
            name: self.name.clone(),
            rx,
            token: token.clone(),
            state: state_rx.clone(),
        };

        let task = runtime.spawn(run_loop(self, tx, Arc::clone(&state), token.clone()));

        (
            PollerHandle {
                info: handle_info,
                token,
                state,
                state_rx,
                task,
            },
            stream,
        )
    }
}

/// Runtime handle for spawning a poller named `name`.
///
/// # Errors
/// Returns `ScrapeError::Spawn` when called outside a Tokio runtime.
pub(crate) fn current_runtime(name: &str) -> Result<Handle, ScrapeError> {
    Handle::try_current().map_err(|e| ScrapeError::Spawn(format!("poller '{}': {}", name, e)))
}

/// Static description of a running poller.
#[derive(Debug, Clone)]
pub struct PollerInfo {
    /// Generation id.
    pub id: Uuid,
    /// Target name the poller is registered under.
    pub name: String,
    /// URL handed to the prober.
    pub url: String,
    /// Time between ticks.
    pub interval: Duration,
}

/// Control side of a started poller, owned by the scheduler.
#[derive(Debug)]
pub struct PollerHandle {
    info: PollerInfo,
    token: CancellationToken,
    state: Arc<watch::Sender<PollerState>>,
    state_rx: watch::Receiver<PollerState>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Name, URL, interval and generation id of this poller.
    pub fn info(&self) -> &PollerInfo {
        &self.info
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PollerState {
        *self.state_rx.borrow()
    }

    /// Signal the poller to stop.
    ///
    /// Never blocks, and is a no-op once the poller has already stopped.
    pub fn stop(&self) {
        self.state.send_if_modified(|state| match state {
            PollerState::Created | PollerState::Running => {
                *state = PollerState::Stopping;
                true
            }
            _ => false,
        });
        self.token.cancel();
    }

    /// Wait until the task has exited and its stream is closed.
    pub async fn stopped(&self) {
        let mut rx = self.state_rx.clone();
        let _ = rx.wait_for(|state| *state == PollerState::Stopped).await;
    }

    /// Signal stop and hand back the task so the caller can join it.
    pub(crate) fn into_task(self) -> JoinHandle<()> {
        self.stop();
        self.task
    }
}

async fn run_loop(
    poller: Poller,
    tx: mpsc::Sender<Measurement>,
    state: Arc<watch::Sender<PollerState>>,
    token: CancellationToken,
) {
    state.send_if_modified(|s| {
        if *s == PollerState::Created {
            *s = PollerState::Running;
            true
        } else {
            false
        }
    });
    tracing::debug!(
        poller = %poller.name,
        id = %poller.id,
        interval = ?poller.interval,
        "Poller started"
    );

    // First tick fires one full interval after start.
    let mut ticker = tokio::time::interval_at(Instant::now() + poller.interval, poller.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = poller.prober.probe().await;

        // A stop that arrived mid-probe wins over the result.
        if token.is_cancelled() {
            break;
        }

        let measurement = match result {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(
                    poller = %poller.name,
                    url = %e.url(),
                    error = %e,
                    "Probe failed"
                );
                continue;
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            sent = tx.send(measurement) => {
                if sent.is_err() {
                    // Consumer dropped the stream; keep running until told to stop.
                    tracing::debug!(poller = %poller.name, "Stream receiver dropped");
                    continue;
                }
            }
        }

        // The slot frees up only once the consumer has taken the measurement.
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            permit = tx.reserve() => drop(permit),
        }
    }

    drop(tx);
    state.send_replace(PollerState::Stopped);
    tracing::info!(poller = %poller.name, id = %poller.id, "Poller stopped");
}
