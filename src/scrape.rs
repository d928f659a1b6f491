//! Scrape Layer
//!
//! Periodic HTTP probing with one independent poller per named target. Each
//! poller runs in its own Tokio task and streams measurements to whoever
//! holds its [`MeasurementStream`].
//!
//! # Architecture
//!
//! - [`Prober`]: performs one measurement (see [`HttpProber`])
//! - [`Poller`]: ticks on a fixed interval and forwards measurements
//! - [`Scheduler`]: owns the name → poller registry and its lifecycle
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use vigil::scrape::Scheduler;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let client = reqwest::Client::builder()
//!     .timeout(Duration::from_secs(5))
//!     .build()?;
//! let scheduler = Scheduler::new(client);
//!
//! let mut stream = scheduler
//!     .run("example", "https://example.com", Duration::from_secs(30))
//!     .await?;
//! while let Some(m) = stream.recv().await {
//!     println!("{} {}B {}ms", m.status_code, m.response_size_bytes, m.response_time_ms);
//! }
//! # Ok(())
//! # }
//! ```

mod poller;
mod prober;
mod scheduler;
mod traits;

pub use poller::{MeasurementStream, Poller, PollerHandle, PollerInfo, PollerState};
pub use prober::{HttpProber, HttpProberFactory};
pub use scheduler::{DEFAULT_SHUTDOWN_TIMEOUT, Scheduler, TargetInfo};
pub use traits::{HttpClient, Measurement, ProbeError, Prober, ProberFactory, ScrapeError};
