//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! across all module-registry crates.
//!
//! # Usage
//!
//! ```rust,no_run
//! use modreg_common::config::{ConfigLoader, RegistryConfig};
//! use std::path::Path;
//!
//! let cfg = RegistryConfig::load(Path::new("registry.toml")).expect("load config");
//! println!("repo root: {}", cfg.repo_root.display());
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Log level for configuration (replaces `log::Level`).
///
/// Serializes to lowercase strings: "trace", "debug", "info", "warn", "error".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level verbosity.
    Trace,
    /// Debug-level verbosity.
    Debug,
    /// Info-level verbosity (default).
    Info,
    /// Warning-level verbosity.
    Warn,
    /// Error-level verbosity.
    Error,
}

impl LogLevel {
    /// Render as the filter string `tracing_subscriber::EnvFilter` expects.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Unknown field in TOML (strict parsing with `deny_unknown_fields`).
    #[error("Unknown field: {0}")]
    UnknownField(String),
}

/// Trait for loading configuration from TOML files.
///
/// Default implementation works for any `serde::de::DeserializeOwned` type.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

fn default_repo_root() -> PathBuf {
    PathBuf::from("/dev/shm/modreg")
}

fn default_lock_timeout_ms() -> u64 {
    2500
}

fn default_conn_list_lock_timeout_ms() -> u64 {
    1000
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

/// Configuration for an instance of the module registry.
///
/// # TOML Example
///
/// ```toml
/// repo_root = "/dev/shm/modreg"
/// lock_timeout_ms = 2500
/// conn_list_lock_timeout_ms = 1000
/// log_level = "info"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base directory under which `main_shm`, `ext_shm`, lock files and
    /// per-module datastore files are created.
    #[serde(default = "default_repo_root")]
    pub repo_root: PathBuf,

    /// Bound, in milliseconds, applied to every process-shared mutex/rwlock
    /// acquisition (create-lock excluded — that one blocks unconditionally).
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Bound, in milliseconds, applied to the connection liveness tracker's
    /// process-local mutex.
    #[serde(default = "default_conn_list_lock_timeout_ms")]
    pub conn_list_lock_timeout_ms: u64,

    /// Log verbosity passed to the tracing subscriber initializer.
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            repo_root: default_repo_root(),
            lock_timeout_ms: default_lock_timeout_ms(),
            conn_list_lock_timeout_ms: default_conn_list_lock_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

impl RegistryConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if any timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "lock_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.conn_list_lock_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "conn_list_lock_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Path to the main SHM backing file.
    pub fn main_shm_path(&self) -> PathBuf {
        self.repo_root.join("main_shm")
    }

    /// Path to the ext SHM backing file.
    pub fn ext_shm_path(&self) -> PathBuf {
        self.repo_root.join("ext_shm")
    }

    /// Path to the create-lock file (never the SHM file itself).
    pub fn create_lock_path(&self) -> PathBuf {
        self.repo_root.join("main_shm.lock")
    }

    /// Directory containing per-connection lock files.
    pub fn conn_dir(&self) -> PathBuf {
        self.repo_root.join("conn")
    }

    /// Path to a specific connection's lock file.
    pub fn conn_lock_path(&self, cid: u32) -> PathBuf {
        self.conn_dir().join(format!("{cid}.lock"))
    }

    /// Directory containing per-module datastore files.
    pub fn data_dir(&self) -> PathBuf {
        self.repo_root.join("data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(default_log_level(), LogLevel::Info);
    }

    #[test]
    fn test_registry_config_defaults() {
        let cfg = RegistryConfig::default();
        assert_eq!(cfg.repo_root, PathBuf::from("/dev/shm/modreg"));
        assert_eq!(cfg.lock_timeout_ms, 2500);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_registry_config_paths() {
        let cfg = RegistryConfig {
            repo_root: PathBuf::from("/tmp/reg"),
            ..Default::default()
        };
        assert_eq!(cfg.main_shm_path(), PathBuf::from("/tmp/reg/main_shm"));
        assert_eq!(cfg.create_lock_path(), PathBuf::from("/tmp/reg/main_shm.lock"));
        assert_eq!(cfg.conn_lock_path(7), PathBuf::from("/tmp/reg/conn/7.lock"));
    }

    #[test]
    fn test_registry_config_rejects_zero_timeout() {
        let cfg = RegistryConfig {
            lock_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = RegistryConfig::load(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = RegistryConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_config_loader_success() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"repo_root = "/dev/shm/modreg_test"
lock_timeout_ms = 500
conn_list_lock_timeout_ms = 100
log_level = "debug"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let cfg = RegistryConfig::load(file.path()).unwrap();
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!(cfg.lock_timeout_ms, 500);
    }
}
