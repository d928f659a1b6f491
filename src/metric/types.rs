//! Metric records and query filters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scrape::Measurement;

/// A persisted measurement, tagged with the target it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    /// Store-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Target name.
    pub name: String,
    pub status_code: u16,
    pub response_size_bytes: u64,
    pub response_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl Metric {
    /// Build an unsaved metric from a measurement of target `name`.
    pub fn from_measurement(name: impl Into<String>, m: Measurement) -> Self {
        Self {
            id: None,
            name: name.into(),
            status_code: m.status_code,
            response_size_bytes: m.response_size_bytes,
            response_time_ms: m.response_time_ms,
            created_at: m.created_at,
        }
    }
}

/// Selects metrics of one target created at or after `since`.
#[derive(Debug, Clone)]
pub struct MetricFilter {
    pub name: String,
    pub since: DateTime<Utc>,
}

impl MetricFilter {
    pub fn new(name: impl Into<String>, since: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            since,
        }
    }

    /// Whether `metric` passes this filter.
    pub fn matches(&self, metric: &Metric) -> bool {
        metric.name == self.name && metric.created_at >= self.since
    }
}
