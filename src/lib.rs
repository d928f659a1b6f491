//! Vigil - Periodic HTTP Scrape Scheduler
//!
//! This crate probes a set of named HTTP targets on fixed intervals and turns
//! each probe into a measurement. It can be embedded as a library, or run as a
//! standalone binary with the `vigil` executable.
//!
//! # Architecture
//!
//! - **Scrape**: one poller task per target, managed by a [`Scheduler`]
//! - **Metric**: consumers that drain measurement streams into a store
//! - **Target**: the configured target set, kept in sync with the scheduler
//! - **Config**: YAML configuration for the binary
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vigil::{InMemoryMetricStore, MetricService, Scheduler, Target, TargetService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scheduler = Arc::new(Scheduler::new(reqwest::Client::new()));
//!     let metrics = MetricService::new(Arc::new(InMemoryMetricStore::new()));
//!     let targets = TargetService::new(scheduler, metrics);
//!
//!     targets
//!         .create(Target::new("example", "https://example.com").with_interval(Duration::from_secs(10)))
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     targets.shutdown(Duration::from_secs(5)).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod metric;
pub mod scrape;
pub mod target;

pub use metric::{
    InMemoryMetricStore, JsonLinesMetricStore, Metric, MetricError, MetricFilter, MetricService,
    MetricStore,
};
pub use scrape::{
    HttpClient, HttpProber, Measurement, MeasurementStream, ProbeError, Prober, Scheduler,
    ScrapeError,
};
pub use target::{Target, TargetError, TargetService};
