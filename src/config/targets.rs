//! Target list configuration.

use std::borrow::Cow;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::target::Target;

use super::error::ConfigError;

/// A list of targets, as found in the main config or in a `target_path` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetsConfig {
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl TargetsConfig {
    /// Read a single target file. URLs are not expanded yet.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            origin: Some(path.to_path_buf()),
            source,
        })
    }

    /// Load targets from all YAML files in a directory.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.extend_from_dir(dir.as_ref())?;
        Ok(config)
    }

    /// Substitute `${VAR}` / `${VAR:-default}` in every target URL.
    pub fn expand_env(&mut self) {
        for target in &mut self.targets {
            if let Cow::Owned(url) = expand_env(&target.url) {
                target.url = url;
            }
        }
    }

    /// Validate every target and reject duplicate names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_targets(&self.targets, &mut HashSet::new(), None)
    }

    /// Append the targets of every `*.yaml` / `*.yml` file in `dir`, in file
    /// name order.
    ///
    /// Each file is expanded and validated on its own, and its names must not
    /// clash with targets already present.
    pub fn extend_from_dir(&mut self, dir: &Path) -> Result<(), ConfigError> {
        if !dir.is_dir() {
            return Err(ConfigError::NotADirectory(dir.to_path_buf()));
        }

        let entries = std::fs::read_dir(dir).map_err(|source| ConfigError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && matches!(
                        path.extension().and_then(|e| e.to_str()),
                        Some("yaml" | "yml")
                    )
            })
            .collect();
        paths.sort();

        for path in paths {
            tracing::debug!(path = %path.display(), "Loading target file");
            self.extend_from_file(&path)?;
        }
        Ok(())
    }

    fn extend_from_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let mut file = Self::from_file(path)?;
        file.expand_env();

        let mut seen: HashSet<&str> = self.targets.iter().map(|t| t.name.as_str()).collect();
        check_targets(&file.targets, &mut seen, Some(path))?;

        self.targets.append(&mut file.targets);
        Ok(())
    }
}

/// Validate `targets` in order, recording their names in `seen`.
pub(super) fn check_targets<'a>(
    targets: &'a [Target],
    seen: &mut HashSet<&'a str>,
    origin: Option<&Path>,
) -> Result<(), ConfigError> {
    for target in targets {
        if !seen.insert(target.name.as_str()) {
            return Err(ConfigError::DuplicateTarget {
                name: target.name.clone(),
                origin: origin.map(Path::to_path_buf),
            });
        }
        target
            .validate()
            .map_err(|source| ConfigError::InvalidTarget {
                origin: origin.map(Path::to_path_buf),
                source,
            })?;
    }
    Ok(())
}

fn env_reference() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env reference pattern is valid")
    })
}

/// Expand environment references in a URL. An unset variable without a
/// default expands to nothing.
fn expand_env(url: &str) -> Cow<'_, str> {
    env_reference().replace_all(url, |caps: &Captures| {
        match (std::env::var(&caps[1]), caps.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => {
                tracing::warn!(variable = &caps[1], "Unset variable in target URL");
                String::new()
            }
        }
    })
}
