//! Metric Layer
//!
//! Consumes per-target measurement streams and persists them:
//! - [`MetricService`]: drains a [`MeasurementStream`](crate::scrape::MeasurementStream)
//!   into a store and answers queries
//! - [`MetricStore`]: storage backend trait
//! - [`InMemoryMetricStore`] / [`JsonLinesMetricStore`]: bundled backends

mod error;
mod service;
mod store;
mod types;

pub use error::MetricError;
pub use service::MetricService;
pub use store::{InMemoryMetricStore, JsonLinesMetricStore, MetricStore};
pub use types::{Metric, MetricFilter};
