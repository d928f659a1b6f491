//! HTTP endpoint prober.
//!
//! Issues a single GET, drains the body and reports status, size and latency.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::scrape::{HttpClient, Measurement, ProbeError, Prober, ProberFactory};

/// Stateless HTTP GET prober.
pub struct HttpProber {
    client: Arc<dyn HttpClient>,
    url: String,
}

impl HttpProber {
    /// Create a prober for `url` on top of a shared client.
    pub fn new(client: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl std::fmt::Debug for HttpProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProber")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    fn url(&self) -> &str {
        &self.url
    }

    async fn probe(&self) -> Result<Measurement, ProbeError> {
        let target = reqwest::Url::parse(&self.url).map_err(|source| ProbeError::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;
        let request = reqwest::Request::new(reqwest::Method::GET, target);

        let start = Instant::now();
        let mut response =
            self.client
                .execute(request)
                .await
                .map_err(|source| ProbeError::Request {
                    url: self.url.clone(),
                    source,
                })?;
        let status_code = response.status().as_u16();

        // Drain the body chunk by chunk; only the byte count is kept.
        let mut response_size_bytes = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|source| ProbeError::Body {
            url: self.url.clone(),
            source,
        })? {
            response_size_bytes += chunk.len() as u64;
        }

        let elapsed = start.elapsed();
        let response_time_ms = elapsed.as_millis().min(u64::MAX as u128) as u64;

        tracing::debug!(
            url = %self.url,
            status = status_code,
            bytes = response_size_bytes,
            latency_ms = response_time_ms,
            "HTTP probe completed"
        );

        Ok(Measurement {
            status_code,
            response_size_bytes,
            response_time_ms,
            created_at: Utc::now(),
        })
    }
}

/// Builds an [`HttpProber`] per target, all sharing one client.
#[derive(Clone)]
pub struct HttpProberFactory {
    client: Arc<dyn HttpClient>,
}

impl HttpProberFactory {
    pub fn new(client: impl HttpClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn from_shared(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

impl ProberFactory for HttpProberFactory {
    fn prober(&self, url: &str) -> Arc<dyn Prober> {
        Arc::new(HttpProber::new(Arc::clone(&self.client), url))
    }
}
