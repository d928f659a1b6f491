//! Configuration module for Vigil.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Shared HTTP client settings (timeout, user agent)
//! - Scheduler settings (shutdown timeout)
//! - Metric output
//! - Targets, inline or from a directory of YAML files

mod app;
mod error;
mod targets;

pub use app::{
    AppConfig, ClientConfig, DEFAULT_CLIENT_TIMEOUT, OutputConfig, ScrapeConfig, parse_duration,
};
pub use error::ConfigError;
pub use targets::TargetsConfig;
