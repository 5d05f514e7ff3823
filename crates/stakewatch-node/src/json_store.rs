//! JSON file history backend.
//!
//! Layout is one object keyed by decimal uid:
//!
//! ```json
//! { "12": [ { "observed_at": 1700000000.0, "block": 720, "stake": 10.0, "emission": 0.1, "trust": 1.0 } ] }
//! ```
//!
//! Files written by older validators use `timestamp` instead of
//! `observed_at`; both are accepted on load. Saves go through a temporary
//! file and a rename so a crash never leaves a truncated history behind.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use stakewatch_core::error::PersistError;
use stakewatch_core::history::HistoryMap;
use stakewatch_core::traits::HistoryBackend;
use stakewatch_core::types::{StakeSnapshot, parse_uid};

#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl HistoryBackend for JsonFileBackend {
    /// Read the file, salvaging every well-formed uid.
    ///
    /// A missing file is an empty map. A file that is not a JSON object is
    /// [`PersistError::Corrupt`]. Individual entries with a non-numeric key or
    /// an unreadable snapshot array are skipped.
    fn load(&mut self) -> Result<HistoryMap, PersistError> {
        if !self.path.exists() {
            return Ok(HistoryMap::new());
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| PersistError::Io(e.to_string()))?;
        let root: Value = serde_json::from_str(&raw).map_err(|e| PersistError::Corrupt(e.to_string()))?;
        let Value::Object(entries) = root else {
            return Err(PersistError::Corrupt("top level is not an object".to_string()));
        };

        let mut histories = HistoryMap::new();
        for (key, value) in entries {
            let uid = match parse_uid(&key) {
                Ok(uid) => uid,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "skipping history entry");
                    continue;
                }
            };
            match serde_json::from_value::<Vec<StakeSnapshot>>(value) {
                Ok(snapshots) => {
                    histories.insert(uid, snapshots);
                }
                Err(e) => warn!(uid, error = %e, "skipping unreadable history"),
            }
        }
        debug!(path = %self.path.display(), tracked = histories.len(), "history file read");
        Ok(histories)
    }

    fn save(&mut self, histories: &HistoryMap) -> Result<(), PersistError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| PersistError::Io(e.to_string()))?;
        }
        let bytes = serde_json::to_vec_pretty(histories).map_err(|e| PersistError::Corrupt(e.to_string()))?;
        let tmp = self.temp_path();
        fs::write(&tmp, bytes).map_err(|e| PersistError::Io(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| PersistError::Io(e.to_string()))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
