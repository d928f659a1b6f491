//! Core scrape traits and types.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned synchronously by the [`Scheduler`](crate::scrape::Scheduler).
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// A poller for this name is already active.
    #[error("target '{0}' is already scheduled")]
    DuplicateTarget(String),

    /// No poller is registered under this name.
    #[error("target '{0}' is not scheduled")]
    UnknownTarget(String),

    /// The scrape interval is zero.
    #[error("target '{0}': scrape interval must be greater than zero")]
    InvalidInterval(String),

    /// The poller task could not be started.
    #[error("failed to start poller: {0}")]
    Spawn(String),
}

/// A single tick's failure.
///
/// Probe errors never leave the poller: they are logged and the loop moves on
/// to the next tick.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The target URL could not be parsed.
    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Connect error, timeout or any other transport failure.
    #[error("request to '{url}' failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response arrived but its body could not be read to completion.
    #[error("failed to read response body from '{url}': {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ProbeError {
    /// URL of the target that failed.
    pub fn url(&self) -> &str {
        match self {
            Self::InvalidUrl { url, .. } | Self::Request { url, .. } | Self::Body { url, .. } => {
                url
            }
        }
    }
}

/// Result of one successful probe.
///
/// Any HTTP status counts as a measurement; only transport and IO failures
/// are errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    /// HTTP status code of the response.
    pub status_code: u16,
    /// Number of body bytes read.
    pub response_size_bytes: u64,
    /// Milliseconds from just before the request until the body was drained.
    pub response_time_ms: u64,
    /// Completion time of the probe.
    pub created_at: DateTime<Utc>,
}

/// Injected HTTP transport.
///
/// Timeout, TLS and proxy policy belong to the implementation and are shared by
/// every prober built on top of it.
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Perform the request and return the response head, or a transport error.
    async fn execute(&self, request: reqwest::Request) -> reqwest::Result<reqwest::Response>;
}

#[async_trait::async_trait]
impl HttpClient for reqwest::Client {
    async fn execute(&self, request: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        reqwest::Client::execute(self, request).await
    }
}

/// One measurement attempt against a single target.
///
/// Implementations hold no per-call state and never retry.
#[async_trait::async_trait]
pub trait Prober: Send + Sync + 'static {
    /// URL this prober targets.
    fn url(&self) -> &str;

    /// Perform exactly one probe.
    async fn probe(&self) -> Result<Measurement, ProbeError>;
}

/// Builds a [`Prober`] for a target URL.
pub trait ProberFactory: Send + Sync + 'static {
    fn prober(&self, url: &str) -> Arc<dyn Prober>;
}

impl<F> ProberFactory for F
where
    F: Fn(&str) -> Arc<dyn Prober> + Send + Sync + 'static,
{
    fn prober(&self, url: &str) -> Arc<dyn Prober> {
        self(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_carries_url() {
        let source = url::Url::parse("not a url").unwrap_err();
        let err = ProbeError::InvalidUrl {
            url: "not a url".to_string(),
            source,
        };
        assert_eq!(err.url(), "not a url");
        assert!(err.to_string().contains("invalid url 'not a url'"));
    }

    #[test]
    fn test_scrape_error_messages() {
        assert_eq!(
            ScrapeError::DuplicateTarget("api".into()).to_string(),
            "target 'api' is already scheduled"
        );
        assert_eq!(
            ScrapeError::UnknownTarget("api".into()).to_string(),
            "target 'api' is not scheduled"
        );
    }

    #[test]
    fn test_measurement_serializes_with_snake_case_fields() {
        let m = Measurement {
            status_code: 503,
            response_size_bytes: 0,
            response_time_ms: 12,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["status_code"], 503);
        assert_eq!(json["response_size_bytes"], 0);
        assert_eq!(json["response_time_ms"], 12);
    }
}
