//! # stakewatch-node — Validator-side wiring for Stakewatch.
//!
//! Composes the detection engine with durable storage and configuration:
//! - [`json_store::JsonFileBackend`] — portable JSON history file
//! - [`storage::RocksBackend`] — RocksDB history store (feature `rocksdb`)
//! - [`config::NodeConfig`] — file and environment configuration
//! - [`replay`] — recorded cycle input for offline runs

pub mod config;
pub mod json_store;
pub mod replay;
#[cfg(feature = "rocksdb")]
pub mod storage;

use stakewatch_core::error::PersistError;
use stakewatch_core::traits::HistoryBackend;

pub use config::{BackendKind, LogFormat, NodeConfig};
pub use json_store::JsonFileBackend;
pub use replay::{ReplayCycle, ReplayError, parse_cycles, read_cycles};
#[cfg(feature = "rocksdb")]
pub use storage::RocksBackend;

/// Open the backend selected by `config`.
pub fn open_backend(config: &NodeConfig) -> Result<Box<dyn HistoryBackend>, PersistError> {
    match config.backend {
        BackendKind::Json => Ok(Box::new(JsonFileBackend::new(config.history_file()))),
        #[cfg(feature = "rocksdb")]
        BackendKind::Rocksdb => Ok(Box::new(RocksBackend::open(config.history_db())?)),
        #[cfg(not(feature = "rocksdb"))]
        BackendKind::Rocksdb => Err(PersistError::Storage(
            "built without the rocksdb feature".to_string(),
        )),
    }
}
