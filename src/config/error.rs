//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::target::TargetError;

/// Errors raised while loading or validating configuration.
///
/// Target errors carry the file the offending entry came from; `None` means
/// the main configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config or target file could not be read.
    #[error("cannot read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config or target file is not valid YAML for its schema.
    #[error("cannot parse {}: {source}", describe(.origin))]
    Parse {
        origin: Option<PathBuf>,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("target_path '{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// Two targets share a name. `origin` is where the second one was found.
    #[error("duplicate target name '{name}' in {}", describe(.origin))]
    DuplicateTarget {
        name: String,
        origin: Option<PathBuf>,
    },

    #[error("{source} (in {})", describe(.origin))]
    InvalidTarget {
        origin: Option<PathBuf>,
        #[source]
        source: TargetError,
    },

    #[error("invalid duration '{input}': {source}")]
    InvalidDuration {
        input: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("client timeout must be greater than zero")]
    ZeroClientTimeout,
}

fn describe(origin: &Option<PathBuf>) -> String {
    match origin {
        Some(path) => format!("'{}'", path.display()),
        None => "main config".to_string(),
    }
}
