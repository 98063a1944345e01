//! Application settings and paths.
//!
//! Settings live in an optional JSON file under the XDG config directory.
//! Every field has a default, so a missing file or a partial one is fine.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application directory paths following the XDG Base Directory Specification.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Configuration directory (~/.config/portsweep)
    pub config_dir: PathBuf,
}

impl Paths {
    pub fn new() -> ConfigResult<Self> {
        let project = ProjectDirs::from("com", "portsweep", "portsweep")
            .ok_or(ConfigError::DirectoryNotFound)?;

        Ok(Self {
            config_dir: project.config_dir().to_path_buf(),
        })
    }

    /// Get the path to the settings file.
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }
}

/// Application-wide settings. Command-line flags take precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Cap on probes in flight; unset means one per (address, port) pair.
    pub max_workers: Option<usize>,
    /// Seconds to wait for outstanding probes before giving up.
    pub drain_timeout_secs: Option<u64>,
    pub verbose: bool,
    pub json: bool,
    /// `tracing` filter directive, e.g. `info` or `portsweep=debug`.
    pub log_level: Option<String>,
}

impl AppSettings {
    /// Load settings from the default location, or defaults if there is none.
    pub fn load() -> ConfigResult<Self> {
        let file = Paths::new()?.settings_file();

        if !file.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&file)
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))
    }

    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn settings_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_settings() {
        let settings = AppSettings::default();
        assert_eq!(settings.max_workers, None);
        assert_eq!(settings.drain_timeout(), None);
        assert!(!settings.verbose);
        assert!(!settings.json);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = settings_file(r#"{ "max_workers": 200, "drain_timeout_secs": 30 }"#);
        let settings = AppSettings::load_from(file.path()).unwrap();

        assert_eq!(settings.max_workers, Some(200));
        assert_eq!(settings.drain_timeout(), Some(Duration::from_secs(30)));
        assert!(!settings.verbose);
        assert_eq!(settings.log_level, None);
    }

    #[test]
    fn test_full_file() {
        let file = settings_file(
            r#"{ "max_workers": 8, "verbose": true, "json": true, "log_level": "debug" }"#,
        );
        let settings = AppSettings::load_from(file.path()).unwrap();

        assert!(settings.verbose);
        assert!(settings.json);
        assert_eq!(settings.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_malformed_file() {
        let file = settings_file("max_workers = 8");
        let err = AppSettings::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFormat(_)));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppSettings::load_from(&dir.path().join("settings.json")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFailed { .. }));
    }
}
