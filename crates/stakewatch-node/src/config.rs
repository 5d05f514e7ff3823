//! Node configuration for a Stakewatch validator.
//!
//! [`NodeConfig`] holds the data directory, subnet id, storage backend choice,
//! logging settings, and the nested [`EngineConfig`]. It is loaded by
//! [`NodeConfig::load`] from an optional TOML/JSON/YAML file layered under
//! `STAKEWATCH__*` environment variables (`STAKEWATCH__ENGINE__SAVE_INTERVAL_SECS=600`).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use stakewatch_core::config::EngineConfig;
use stakewatch_core::constants::DEFAULT_NETUID;
use stakewatch_core::error::ConfigError;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "STAKEWATCH";

/// Durable medium for stake histories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Json,
    Rocksdb,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "rocksdb" | "rocks" => Ok(Self::Rocksdb),
            other => Err(format!("unknown backend: {other} (expected json or rocksdb)")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Rocksdb => f.write_str("rocksdb"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other} (expected text or json)")),
        }
    }
}

/// Configuration for a validator-side Stakewatch instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Subnet id; names the history file.
    pub netuid: u16,
    pub backend: BackendKind,
    /// Log level filter string (e.g. "info", "stakewatch_detect=debug").
    pub log_level: String,
    pub log_format: LogFormat,
    pub engine: EngineConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stakewatch");

        Self {
            data_dir,
            netuid: DEFAULT_NETUID,
            backend: BackendKind::Json,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            engine: EngineConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load from `file` (if given and present) and the environment, then
    /// validate the engine section.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let cfg: NodeConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        cfg.engine.validate()?;
        Ok(cfg)
    }

    /// Path of the JSON history file.
    pub fn history_file(&self) -> PathBuf {
        self.data_dir.join(format!("stake_history_{}.json", self.netuid))
    }

    /// Path of the RocksDB history directory.
    pub fn history_db(&self) -> PathBuf {
        self.data_dir.join(format!("stake_history_{}", self.netuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn default_data_dir_ends_with_stakewatch() {
        let cfg = NodeConfig::default();
        assert!(
            cfg.data_dir.ends_with("stakewatch"),
            "data_dir should end with 'stakewatch': {:?}",
            cfg.data_dir
        );
    }

    #[test]
    fn history_file_is_named_by_netuid() {
        let cfg = NodeConfig {
            data_dir: PathBuf::from("/tmp/sw"),
            netuid: 12,
            ..NodeConfig::default()
        };
        assert_eq!(cfg.history_file(), PathBuf::from("/tmp/sw/stake_history_12.json"));
        assert_eq!(cfg.history_db(), PathBuf::from("/tmp/sw/stake_history_12"));
    }

    #[test]
    fn default_netuid_and_backend() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.netuid, 49);
        assert_eq!(cfg.backend, BackendKind::Json);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn parse_backend_and_format() {
        assert_eq!("RocksDB".parse::<BackendKind>().unwrap(), BackendKind::Rocksdb);
        assert_eq!("json".parse::<BackendKind>().unwrap(), BackendKind::Json);
        assert!("sqlite".parse::<BackendKind>().is_err());
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(BackendKind::Rocksdb.to_string(), "rocksdb");
    }

    #[test]
    fn load_without_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = NodeConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg.engine, EngineConfig::default());
        assert_eq!(cfg.netuid, DEFAULT_NETUID);
    }

    #[test]
    fn load_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stakewatch.toml");
        fs::write(
            &path,
            "netuid = 7\nbackend = \"rocksdb\"\n\n[engine]\nsave_interval_secs = 60\n",
        )
        .unwrap();
        let cfg = NodeConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.netuid, 7);
        assert_eq!(cfg.backend, BackendKind::Rocksdb);
        assert_eq!(cfg.engine.save_interval_secs, 60);
        assert_eq!(cfg.engine.snapshot_interval_blocks, 720);
    }

    #[test]
    fn load_rejects_invalid_engine_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[engine]\nblocks_per_hour = 0\n").unwrap();
        assert!(NodeConfig::load(Some(&path)).is_err());
    }
}
