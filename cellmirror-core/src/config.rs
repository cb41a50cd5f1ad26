//! Configuration types

use crate::{ConfigError, MirrorResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix in `store_path` that expands to the user's documents folder.
pub const DOCUMENTS_PREFIX: &str = "%DOCUMENTS%";

/// Where read operations are served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadBackend {
    /// Embedded mirror, gated per table.
    #[default]
    Mirror,
    /// Straight to the system of record.
    Direct,
}

impl std::str::FromStr for ReadBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mirror" => Ok(ReadBackend::Mirror),
            "direct" => Ok(ReadBackend::Direct),
            other => Err(ConfigError::InvalidValue {
                field: "read_backend".to_string(),
                value: other.to_string(),
                reason: "expected 'mirror' or 'direct'".to_string(),
            }),
        }
    }
}

/// System-of-record connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// SQLite path of the system of record.
    pub connection_string: String,
    /// Upper bound for the startup connectivity check.
    pub probe_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            probe_timeout_ms: 3_000,
        }
    }
}

impl RemoteConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Mirror configuration.
///
/// Missing TOML keys fall back to [`Default`]; call [`MirrorConfig::validate`]
/// before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// `%DOCUMENTS%/...`, an absolute path, or a path relative to the
    /// application directory.
    pub store_path: String,
    /// Remove the mirror file after shutdown.
    pub delete_on_exit: bool,
    /// Run `VACUUM` after shutdown. Ignored when the file is deleted.
    pub compact_on_exit: bool,
    /// Schema script run after the built-in DDL.
    pub init_script_path: Option<String>,
    /// Tables loaded concurrently at startup.
    pub max_bootstrap_parallelism: usize,
    /// How long shutdown waits for queued refreshes.
    pub shutdown_grace_ms: u64,
    pub read_backend: ReadBackend,
    pub remote: RemoteConfig,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            store_path: format!("{}/cellmirror/mirror.db", DOCUMENTS_PREFIX),
            delete_on_exit: false,
            compact_on_exit: false,
            init_script_path: None,
            max_bootstrap_parallelism: 4,
            shutdown_grace_ms: 5_000,
            read_backend: ReadBackend::Mirror,
            remote: RemoteConfig::default(),
        }
    }
}

impl MirrorConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn from_toml_str(raw: &str) -> MirrorResult<Self> {
        toml::from_str(raw).map_err(|e| {
            ConfigError::Parse {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> MirrorResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Defaults overlaid with `CELLMIRROR_*` environment variables.
    ///
    /// Environment variables:
    /// - `CELLMIRROR_STORE_PATH`
    /// - `CELLMIRROR_DELETE_ON_EXIT`
    /// - `CELLMIRROR_COMPACT_ON_EXIT`
    /// - `CELLMIRROR_INIT_SCRIPT`
    /// - `CELLMIRROR_MAX_BOOTSTRAP_PARALLELISM` (default: 4)
    /// - `CELLMIRROR_SHUTDOWN_GRACE_MS` (default: 5000)
    /// - `CELLMIRROR_READ_BACKEND` (`mirror` or `direct`)
    /// - `CELLMIRROR_REMOTE_CONNECTION_STRING`
    /// - `CELLMIRROR_REMOTE_PROBE_TIMEOUT_MS` (default: 3000)
    pub fn from_env() -> MirrorResult<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn overlay<F>(mut self, lookup: F) -> MirrorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CELLMIRROR_STORE_PATH") {
            self.store_path = v;
        }
        if let Some(v) = lookup("CELLMIRROR_DELETE_ON_EXIT") {
            self.delete_on_exit = parse_field("delete_on_exit", &v)?;
        }
        if let Some(v) = lookup("CELLMIRROR_COMPACT_ON_EXIT") {
            self.compact_on_exit = parse_field("compact_on_exit", &v)?;
        }
        if let Some(v) = lookup("CELLMIRROR_INIT_SCRIPT") {
            self.init_script_path = if v.trim().is_empty() { None } else { Some(v) };
        }
        if let Some(v) = lookup("CELLMIRROR_MAX_BOOTSTRAP_PARALLELISM") {
            self.max_bootstrap_parallelism = parse_field("max_bootstrap_parallelism", &v)?;
        }
        if let Some(v) = lookup("CELLMIRROR_SHUTDOWN_GRACE_MS") {
            self.shutdown_grace_ms = parse_field("shutdown_grace_ms", &v)?;
        }
        if let Some(v) = lookup("CELLMIRROR_READ_BACKEND") {
            self.read_backend = v.parse()?;
        }
        if let Some(v) = lookup("CELLMIRROR_REMOTE_CONNECTION_STRING") {
            self.remote.connection_string = v;
        }
        if let Some(v) = lookup("CELLMIRROR_REMOTE_PROBE_TIMEOUT_MS") {
            self.remote.probe_timeout_ms = parse_field("remote.probe_timeout_ms", &v)?;
        }
        Ok(self)
    }

    /// Reject settings the runtime cannot start with.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingRequired`] for an empty store path or connection
    /// string, [`ConfigError::InvalidValue`] for zero-valued limits.
    pub fn validate(&self) -> MirrorResult<()> {
        if self.store_path.trim().is_empty() {
            return Err(missing("store_path"));
        }

        if self.remote.connection_string.trim().is_empty() {
            return Err(missing("remote.connection_string"));
        }

        if self.max_bootstrap_parallelism == 0 {
            return Err(invalid(
                "max_bootstrap_parallelism",
                "0",
                "max_bootstrap_parallelism must be at least 1",
            ));
        }

        if self.shutdown_grace_ms == 0 {
            return Err(invalid(
                "shutdown_grace_ms",
                "0",
                "shutdown_grace_ms must be positive",
            ));
        }

        if self.remote.probe_timeout_ms == 0 {
            return Err(invalid(
                "remote.probe_timeout_ms",
                "0",
                "probe_timeout_ms must be positive",
            ));
        }

        Ok(())
    }
}

fn missing(field: &str) -> crate::MirrorError {
    ConfigError::MissingRequired {
        field: field.to_string(),
    }
    .into()
}

fn invalid(field: &str, value: &str, reason: &str) -> crate::MirrorError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn parse_field<T>(field: &str, raw: &str) -> MirrorResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(field, raw, &e.to_string()))
}

// =============================================================================
// TESTS
// =============================================================================
