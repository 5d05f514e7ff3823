//! Trait interfaces for Stakewatch.
//!
//! - [`HistoryBackend`] — durable storage for stake histories
//!   (stakewatch-node implements the JSON file and RocksDB backends)

use crate::error::PersistError;
use crate::history::HistoryMap;

/// Durable key-ordered storage for per-uid snapshot series.
///
/// Backends persist whole histories. Load failures are expected to be handled
/// by the caller by starting from an empty store; no backend error is ever
/// allowed to abort a scoring cycle.
pub trait HistoryBackend {
    /// Read every persisted history. A missing store is `Ok` and empty.
    fn load(&mut self) -> Result<HistoryMap, PersistError>;

    /// Replace the persisted histories with `histories`.
    fn save(&mut self, histories: &HistoryMap) -> Result<(), PersistError>;

    /// Push buffered writes to durable media.
    fn flush(&mut self) -> Result<(), PersistError> {
        Ok(())
    }

    /// Short human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Non-durable backend holding the last saved map in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    saved: HistoryMap,
    saves: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend preloaded with `histories`.
    pub fn with_histories(histories: HistoryMap) -> Self {
        Self {
            saved: histories,
            saves: 0,
        }
    }

    pub fn saved(&self) -> &HistoryMap {
        &self.saved
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl HistoryBackend for MemoryBackend {
    fn load(&mut self) -> Result<HistoryMap, PersistError> {
        Ok(self.saved.clone())
    }

    fn save(&mut self, histories: &HistoryMap) -> Result<(), PersistError> {
        self.saved = histories.clone();
        self.saves += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

impl<B: HistoryBackend + ?Sized> HistoryBackend for Box<B> {
    fn load(&mut self) -> Result<HistoryMap, PersistError> {
        (**self).load()
    }

    fn save(&mut self, histories: &HistoryMap) -> Result<(), PersistError> {
        (**self).save(histories)
    }

    fn flush(&mut self) -> Result<(), PersistError> {
        (**self).flush()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
