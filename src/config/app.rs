//! Application configuration structures.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scrape::DEFAULT_SHUTDOWN_TIMEOUT;
use crate::target::Target;

use super::error::ConfigError;
use super::targets::{TargetsConfig, check_targets};

// =============================================================================
// Constants
// =============================================================================

/// Default HTTP client timeout (5 seconds).
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

fn default_client_timeout() -> Duration {
    DEFAULT_CLIENT_TIMEOUT
}

fn default_user_agent() -> String {
    concat!("vigil/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_shutdown_timeout() -> Duration {
    DEFAULT_SHUTDOWN_TIMEOUT
}

/// Parse a duration given on the command line or in the environment, such as
/// `5s`, `1m30s` or `250ms`.
///
/// ```
/// use std::time::Duration;
/// use vigil::config::parse_duration;
///
/// assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
/// assert!(parse_duration("30").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(input.trim()).map_err(|source| ConfigError::InvalidDuration {
        input: input.to_string(),
        source,
    })
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Shared HTTP client settings, applied to every probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Per-request timeout (default: 5s).
    #[serde(default = "default_client_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// `User-Agent` header (default: "vigil/<version>").
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CLIENT_TIMEOUT,
            user_agent: default_user_agent(),
        }
    }
}

impl ClientConfig {
    /// Build the `reqwest` client described by this config.
    pub fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
    }
}

// =============================================================================
// Scrape Configuration
// =============================================================================

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// How long shutdown waits for pollers and consumers (default: 5s).
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

// =============================================================================
// Output Configuration
// =============================================================================

/// Where metrics go.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// JSON-lines file; metrics are kept in memory when unset.
    #[serde(default)]
    pub path: Option<String>,
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub scrape: ScrapeConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Targets declared inline.
    #[serde(default)]
    pub targets: Vec<Target>,

    /// Directory with additional target files.
    #[serde(default)]
    pub target_path: Option<String>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// Targets from `target_path` are merged in and `${VAR}` references in
    /// URLs are expanded before validation.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, Some(path))
    }

    /// Parse, merge and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, None)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// - `ConfigError::ZeroClientTimeout` if the client timeout is zero
    /// - `ConfigError::DuplicateTarget` / `ConfigError::InvalidTarget` for a bad target
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.timeout.is_zero() {
            return Err(ConfigError::ZeroClientTimeout);
        }
        check_targets(&self.targets, &mut HashSet::new(), None)
    }

    fn parse(content: &str, origin: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config: Self =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                origin: origin.map(Path::to_path_buf),
                source,
            })?;

        // Inline targets first, so a clash is reported against the target file.
        let mut targets = TargetsConfig {
            targets: std::mem::take(&mut config.targets),
        };
        targets.expand_env();
        targets.validate()?;
        if let Some(ref dir) = config.target_path {
            targets.extend_from_dir(Path::new(dir))?;
        }
        config.targets = targets.targets;

        config.validate()?;
        Ok(config)
    }
}
