//! RocksDB-backed stake history storage.
//!
//! One column family maps the big-endian uid to the bincode-encoded snapshot
//! vector. Saves are a single atomic [`WriteBatch`] that also deletes uids no
//! longer tracked, so the database always mirrors one in-memory state.

use std::path::{Path, PathBuf};

use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use tracing::{debug, warn};

use stakewatch_core::error::PersistError;
use stakewatch_core::history::HistoryMap;
use stakewatch_core::traits::HistoryBackend;
use stakewatch_core::types::{StakeSnapshot, Uid};

const CF_STAKE_HISTORY: &str = "stake_history";

pub struct RocksBackend {
    db: DB,
    path: PathBuf,
}

impl RocksBackend {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cfs = vec![ColumnFamilyDescriptor::new(CF_STAKE_HISTORY, Options::default())];
        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cfs)
            .map_err(|e| PersistError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            path: path.as_ref().to_path_buf(),
        })
    }

    fn cf_handle(&self) -> Result<&rocksdb::ColumnFamily, PersistError> {
        self.db
            .cf_handle(CF_STAKE_HISTORY)
            .ok_or_else(|| PersistError::Storage(format!("missing column family: {CF_STAKE_HISTORY}")))
    }

    fn stored_uids(&self) -> Result<Vec<Uid>, PersistError> {
        let cf = self.cf_handle()?;
        let mut uids = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| PersistError::Storage(e.to_string()))?;
            if let Some(uid) = decode_uid(&key) {
                uids.push(uid);
            }
        }
        Ok(uids)
    }
}

fn decode_uid(key: &[u8]) -> Option<Uid> {
    let bytes: [u8; 2] = key.try_into().ok()?;
    Some(Uid::from_be_bytes(bytes))
}

fn encode_history(snapshots: &[StakeSnapshot]) -> Result<Vec<u8>, PersistError> {
    bincode::encode_to_vec(snapshots, bincode::config::standard()).map_err(|e| PersistError::Corrupt(e.to_string()))
}

fn decode_history(data: &[u8]) -> Result<Vec<StakeSnapshot>, PersistError> {
    let (snapshots, _): (Vec<StakeSnapshot>, usize) =
        bincode::decode_from_slice(data, bincode::config::standard()).map_err(|e| PersistError::Corrupt(e.to_string()))?;
    Ok(snapshots)
}

impl HistoryBackend for RocksBackend {
    fn load(&mut self) -> Result<HistoryMap, PersistError> {
        let cf = self.cf_handle()?;
        let mut histories = HistoryMap::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item.map_err(|e| PersistError::Storage(e.to_string()))?;
            let Some(uid) = decode_uid(&key) else {
                warn!(key_len = key.len(), "skipping malformed history key");
                continue;
            };
            match decode_history(&value) {
                Ok(snapshots) => {
                    histories.insert(uid, snapshots);
                }
                Err(e) => warn!(uid, error = %e, "skipping undecodable history"),
            }
        }
        debug!(path = %self.path.display(), tracked = histories.len(), "history database read");
        Ok(histories)
    }

    fn save(&mut self, histories: &HistoryMap) -> Result<(), PersistError> {
        let stale: Vec<Uid> = self
            .stored_uids()?
            .into_iter()
            .filter(|uid| !histories.contains_key(uid))
            .collect();

        let cf = self.cf_handle()?;
        let mut batch = WriteBatch::default();
        for uid in &stale {
            batch.delete_cf(cf, uid.to_be_bytes());
        }
        for (uid, snapshots) in histories {
            batch.put_cf(cf, uid.to_be_bytes(), encode_history(snapshots)?);
        }
        self.db
            .write(batch)
            .map_err(|e| PersistError::Storage(e.to_string()))?;

        if !stale.is_empty() {
            debug!(removed = stale.len(), "deleted untracked histories");
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PersistError> {
        let cf = self.cf_handle()?;
        self.db
            .flush_cf(cf)
            .map_err(|e| PersistError::Storage(e.to_string()))
    }

    fn describe(&self) -> String {
        format!("rocksdb:{}", self.path.display())
    }
}
