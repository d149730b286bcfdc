use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;

use crate::error::{BridgeError, Result};

/// Options for the bridge itself: the runtime it drives the native library on
/// and which optional native features it exposes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Worker threads for the internal runtime. Background syncs run here.
    pub worker_threads: usize,
    pub thread_name: String,
    /// Allow `load_extension` on connections.
    pub allow_extensions: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            thread_name: "libsql-bridge".to_string(),
            allow_extensions: false,
        }
    }
}

impl BridgeConfig {
    #[must_use]
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Parse a config from JSON; missing fields take their defaults.
    ///
    /// # Errors
    /// Returns `BridgeError::ConfigError` on malformed JSON, unknown fields, or a
    /// zero thread count.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: BridgeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(BridgeError::ConfigError(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for `BridgeConfig`.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    #[must_use]
    pub fn worker_threads(mut self, worker_threads: usize) -> Self {
        self.config.worker_threads = worker_threads;
        self
    }

    #[must_use]
    pub fn thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.config.thread_name = thread_name.into();
        self
    }

    #[must_use]
    pub fn allow_extensions(mut self, allow: bool) -> Self {
        self.config.allow_extensions = allow;
        self
    }

    #[must_use]
    pub fn finish(self) -> BridgeConfig {
        self.config
    }
}

/// How a database is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    /// Private in-memory database; the target is ignored.
    Memory,
    /// Local database file at the target path.
    File,
    /// Remote libsql server at the target URL.
    Remote,
    /// Local replica at `replica_path`, kept current from the target URL by sync.
    EmbeddedReplica,
}

/// Everything needed to open one database.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenOptions {
    /// File path for local modes, URL for remote ones.
    pub target: String,
    pub mode: OpenMode,
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Local file backing an embedded replica.
    #[serde(default)]
    pub replica_path: Option<String>,
    /// Run one sync before `open` returns.
    #[serde(default)]
    pub sync_on_open: bool,
    #[serde(default)]
    pub read_your_writes: Option<bool>,
    /// Periodic background sync performed by the native library.
    #[serde(default, with = "duration_millis")]
    pub sync_interval: Option<Duration>,
}

impl OpenOptions {
    #[must_use]
    pub fn new(target: impl Into<String>, mode: OpenMode) -> Self {
        Self {
            target: target.into(),
            mode,
            auth_token: None,
            replica_path: None,
            sync_on_open: false,
            read_your_writes: None,
            sync_interval: None,
        }
    }

    #[must_use]
    pub fn builder(target: impl Into<String>, mode: OpenMode) -> OpenOptionsBuilder {
        OpenOptionsBuilder::new(target, mode)
    }

    /// Parse open options from JSON.
    ///
    /// # Errors
    /// Returns `BridgeError::ConfigError` on malformed JSON or unknown fields.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reject combinations the native library cannot open.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.sync_on_open && self.mode != OpenMode::EmbeddedReplica {
            return Err(BridgeError::OpenFailed {
                reason: "sync_on_open only applies to embedded replicas".to_string(),
            });
        }
        match self.mode {
            OpenMode::Memory => Ok(()),
            OpenMode::File | OpenMode::Remote if self.target.is_empty() => {
                Err(BridgeError::OpenFailed {
                    reason: format!("{:?} mode needs a non-empty target", self.mode),
                })
            }
            OpenMode::EmbeddedReplica if self.replica_path.is_none() => {
                Err(BridgeError::OpenFailed {
                    reason: "embedded replica needs a local replica_path".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Fluent builder for `OpenOptions`.
#[derive(Debug, Clone)]
pub struct OpenOptionsBuilder {
    opts: OpenOptions,
}

impl OpenOptionsBuilder {
    #[must_use]
    pub fn new(target: impl Into<String>, mode: OpenMode) -> Self {
        Self {
            opts: OpenOptions::new(target, mode),
        }
    }

    #[must_use]
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.opts.auth_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn replica_path(mut self, path: impl Into<String>) -> Self {
        self.opts.replica_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn sync_on_open(mut self, sync_on_open: bool) -> Self {
        self.opts.sync_on_open = sync_on_open;
        self
    }

    #[must_use]
    pub fn read_your_writes(mut self, read_your_writes: bool) -> Self {
        self.opts.read_your_writes = Some(read_your_writes);
        self
    }

    #[must_use]
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.opts.sync_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn finish(self) -> OpenOptions {
        self.opts
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_config_defaults_fill_missing_fields() {
        let config = BridgeConfig::from_json_str(r#"{"allow_extensions": true}"#).unwrap();
        assert!(config.allow_extensions);
        assert_eq!(config.worker_threads, BridgeConfig::default().worker_threads);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = BridgeConfig::from_json_str(r#"{"worker_threads": 0}"#).unwrap_err();
        assert!(matches!(err, BridgeError::ConfigError(_)));
    }

    #[test]
    fn open_options_from_json() {
        let opts = OpenOptions::from_json_str(
            r#"{
                "target": "libsql://db.example.com",
                "mode": "embedded_replica",
                "auth_token": "secret",
                "replica_path": "/tmp/replica.db",
                "sync_interval": 1500
            }"#,
        )
        .unwrap();
        assert_eq!(opts.mode, OpenMode::EmbeddedReplica);
        assert_eq!(opts.sync_interval, Some(Duration::from_millis(1500)));
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn replica_without_local_path_fails_validation() {
        let opts = OpenOptions::new("libsql://db.example.com", OpenMode::EmbeddedReplica);
        assert!(matches!(
            opts.validate(),
            Err(BridgeError::OpenFailed { .. })
        ));
    }

    #[test]
    fn sync_on_open_needs_a_replica() {
        let opts = OpenOptions::builder("data.db", OpenMode::File)
            .sync_on_open(true)
            .finish();
        assert!(opts.validate().is_err());
    }
}
