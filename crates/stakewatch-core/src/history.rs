//! Per-entity stake history store.
//!
//! Holds an ordered series of [`StakeSnapshot`]s per uid. Snapshots are only
//! appended at synchronized block heights (see [`crate::schedule`]), which is
//! what lets independent validators end up with identical histories.
//!
//! Two retention policies apply:
//! - **Window retention** runs on every [`StakeHistoryStore::update`]: entries
//!   older than the lookback window are dropped, but never below the
//!   `min_snapshots_for_analysis` floor.
//! - **Age cleanup** runs on demand via [`StakeHistoryStore::cleanup`]: entries
//!   older than `history_max_age_secs` of wall-clock time are dropped unless
//!   fewer than `history_min_entries` would remain.
//!
//! # Invariants
//!
//! * Blocks within a uid's history are strictly increasing.
//! * No stored history is empty.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::HistoryError;
use crate::schedule::SnapshotScheduler;
use crate::types::{LedgerEntry, StakeSnapshot, Uid};

/// Ordered uid → snapshot series map, as persisted by history backends.
pub type HistoryMap = BTreeMap<Uid, Vec<StakeSnapshot>>;

/// What [`StakeHistoryStore::update`] did with an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum UpdateOutcome {
    /// A snapshot was appended.
    Appended,
    /// Not a sampling point; only retention ran, dropping `pruned` entries.
    NotScheduled { pruned: usize },
    /// The block is not newer than the last recorded one; nothing changed.
    Stale { last_block: u64 },
}

/// Result of an age-based cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub tracked: usize,
    pub dropped_entries: usize,
    pub removed_uids: Vec<Uid>,
}

/// In-memory stake history for every tracked uid.
#[derive(Debug, Clone)]
pub struct StakeHistoryStore {
    histories: HistoryMap,
    scheduler: SnapshotScheduler,
    lookback_blocks: u64,
    min_snapshots: usize,
    max_age_secs: u64,
    min_entries: usize,
}

impl StakeHistoryStore {
    /// Create an empty store using the retention settings of `config`.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            histories: HistoryMap::new(),
            scheduler: SnapshotScheduler::new(config.snapshot_interval_blocks),
            lookback_blocks: config.analysis_lookback_blocks,
            min_snapshots: config.min_snapshots_for_analysis,
            max_age_secs: config.history_max_age_secs,
            min_entries: config.history_min_entries,
        }
    }

    /// Create a store and seed it from previously persisted histories.
    ///
    /// Histories that violate the block ordering invariant are dropped and
    /// returned alongside the store so the caller can report them.
    pub fn from_histories(config: &EngineConfig, histories: HistoryMap) -> (Self, Vec<HistoryError>) {
        let mut store = Self::new(config);
        let mut rejected = Vec::new();
        for (uid, snapshots) in histories {
            if let Err(e) = store.insert_history(uid, snapshots) {
                rejected.push(e);
            }
        }
        (store, rejected)
    }

    /// Record one ledger observation at `block`.
    ///
    /// Re-processing the same (or an older) height is a no-op. A snapshot is
    /// appended when `block` is a sampling point or the uid has no history.
    /// Window retention runs whenever the observation is not stale.
    /// A non-finite `observed_at` is rejected like a malformed entry.
    pub fn update(
        &mut self,
        entry: &LedgerEntry,
        block: u64,
        observed_at: f64,
    ) -> Result<UpdateOutcome, HistoryError> {
        entry.validate()?;
        if !observed_at.is_finite() {
            return Err(HistoryError::MalformedInput {
                uid: entry.uid,
                field: "observed_at",
                value: observed_at,
            });
        }

        if let Some(last_block) = self.last_recorded_block(entry.uid) {
            if block <= last_block {
                return Ok(UpdateOutcome::Stale { last_block });
            }
        }

        let history = self.histories.entry(entry.uid).or_default();
        let appended = self.scheduler.should_snapshot(block, history.len());
        if appended {
            history.push(StakeSnapshot {
                observed_at,
                block,
                stake: entry.stake,
                emission: entry.emission,
                trust: entry.trust,
            });
            debug!(uid = entry.uid, block, stake = entry.stake, "snapshot recorded");
        }

        let pruned = retain_window(history, block, self.lookback_blocks, self.min_snapshots);
        if appended {
            Ok(UpdateOutcome::Appended)
        } else {
            Ok(UpdateOutcome::NotScheduled { pruned })
        }
    }

    /// Replace the history of `uid` with `snapshots`.
    ///
    /// Blocks must be strictly increasing. An empty series removes the uid.
    pub fn insert_history(&mut self, uid: Uid, snapshots: Vec<StakeSnapshot>) -> Result<(), HistoryError> {
        for pair in snapshots.windows(2) {
            if pair[1].block <= pair[0].block {
                return Err(HistoryError::NonIncreasingBlock {
                    uid,
                    block: pair[1].block,
                    previous: pair[0].block,
                });
            }
        }
        if snapshots.is_empty() {
            self.histories.remove(&uid);
        } else {
            self.histories.insert(uid, snapshots);
        }
        Ok(())
    }

    /// Snapshots recorded for `uid`, oldest first.
    pub fn history(&self, uid: Uid) -> Option<&[StakeSnapshot]> {
        self.histories.get(&uid).map(Vec::as_slice)
    }

    pub fn last_recorded_block(&self, uid: Uid) -> Option<u64> {
        self.histories.get(&uid).and_then(|h| h.last()).map(|s| s.block)
    }

    /// Number of snapshots held for `uid` (0 if unknown).
    pub fn snapshot_count(&self, uid: Uid) -> usize {
        self.histories.get(&uid).map_or(0, Vec::len)
    }

    /// Number of tracked uids.
    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    pub fn uids(&self) -> impl Iterator<Item = Uid> + '_ {
        self.histories.keys().copied()
    }

    pub fn histories(&self) -> &HistoryMap {
        &self.histories
    }

    /// Age-based garbage collection relative to wall-clock `now`.
    ///
    /// Keeps entries newer than `history_max_age_secs` when at least
    /// `history_min_entries` of them exist; otherwise keeps the newest
    /// `history_min_entries` (or everything, if fewer exist). Uids left with
    /// no entries are removed.
    pub fn cleanup(&mut self, now: f64) -> CleanupReport {
        let cutoff = now - self.max_age_secs as f64;
        let min_entries = self.min_entries;
        let mut report = CleanupReport::default();

        for history in self.histories.values_mut() {
            let before = history.len();
            let fresh = history.iter().filter(|s| s.observed_at > cutoff).count();
            if fresh >= min_entries {
                history.retain(|s| s.observed_at > cutoff);
            } else if history.len() >= min_entries {
                let excess = history.len() - min_entries;
                history.drain(..excess);
            }
            report.dropped_entries += before - history.len();
        }

        self.histories.retain(|uid, history| {
            if history.is_empty() {
                report.removed_uids.push(*uid);
                false
            } else {
                true
            }
        });
        report.tracked = self.histories.len();

        info!(
            tracked = report.tracked,
            dropped = report.dropped_entries,
            removed = report.removed_uids.len(),
            "history cleanup complete"
        );
        if !report.removed_uids.is_empty() {
            info!(uids = ?report.removed_uids, "removed empty histories");
        }
        report
    }
}

/// Drop entries at or below `block - lookback`, unless fewer than `min`
/// entries would remain, in which case keep the newest `min`. Returns the
/// number of entries dropped.
fn retain_window(history: &mut Vec<StakeSnapshot>, block: u64, lookback: u64, min: usize) -> usize {
    let first_in_window = match block.checked_sub(lookback) {
        Some(cutoff) => history.partition_point(|s| s.block <= cutoff),
        None => 0,
    };
    let in_window = history.len() - first_in_window;
    let drop = if in_window >= min {
        first_in_window
    } else {
        history.len().saturating_sub(min)
    };
    history.drain(..drop);
    drop
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn entry(uid: Uid, stake: f64) -> LedgerEntry {
        LedgerEntry {
            uid,
            stake,
            emission: 1.0,
            trust: 1.0,
        }
    }

    fn snap(block: u64, stake: f64, observed_at: f64) -> StakeSnapshot {
        StakeSnapshot {
            observed_at,
            block,
            stake,
            emission: 1.0,
            trust: 1.0,
        }
    }

    fn small_config() -> EngineConfig {
        EngineConfig {
            snapshot_interval_blocks: 100,
            analysis_lookback_blocks: 500,
            min_snapshots_for_analysis: 3,
            history_min_entries: 4,
            history_max_age_secs: 1_000,
            ..EngineConfig::default()
        }
    }

    fn blocks(store: &StakeHistoryStore, uid: Uid) -> Vec<u64> {
        store
            .history(uid)
            .unwrap_or_default()
            .iter()
            .map(|s| s.block)
            .collect()
    }

    // -------------------------------------------------------------------------
    // update
    // -------------------------------------------------------------------------

    #[test]
    fn first_observation_bootstraps_off_schedule() {
        let mut store = StakeHistoryStore::new(&EngineConfig::default());
        let out = store.update(&entry(1, 100.0), 1_001, 0.0).unwrap();
        assert_eq!(out, UpdateOutcome::Appended);
        assert_eq!(blocks(&store, 1), vec![1_001]);
    }

    #[test]
    fn off_schedule_blocks_are_not_recorded() {
        let mut store = StakeHistoryStore::new(&EngineConfig::default());
        store.update(&entry(1, 100.0), 1_000, 0.0).unwrap();
        let out = store.update(&entry(1, 90.0), 1_200, 0.0).unwrap();
        assert_eq!(out, UpdateOutcome::NotScheduled { pruned: 0 });
        let out = store.update(&entry(1, 80.0), 1_440, 0.0).unwrap();
        assert_eq!(out, UpdateOutcome::Appended);
        assert_eq!(blocks(&store, 1), vec![1_000, 1_440]);
    }

    #[test]
    fn same_block_twice_is_idempotent() {
        let mut store = StakeHistoryStore::new(&EngineConfig::default());
        store.update(&entry(3, 100.0), 1_440, 0.0).unwrap();
        let out = store.update(&entry(3, 50.0), 1_440, 5.0).unwrap();
        assert_eq!(out, UpdateOutcome::Stale { last_block: 1_440 });
        assert_eq!(store.snapshot_count(3), 1);
        assert_eq!(store.history(3).unwrap()[0].stake, 100.0);
    }

    #[test]
    fn older_block_is_stale() {
        let mut store = StakeHistoryStore::new(&EngineConfig::default());
        store.update(&entry(3, 100.0), 2_160, 0.0).unwrap();
        let out = store.update(&entry(3, 100.0), 1_440, 0.0).unwrap();
        assert_eq!(out, UpdateOutcome::Stale { last_block: 2_160 });
    }

    #[test]
    fn malformed_entry_leaves_store_untouched() {
        let mut store = StakeHistoryStore::new(&EngineConfig::default());
        let err = store.update(&entry(4, f64::NAN), 720, 0.0).unwrap_err();
        assert!(matches!(err, HistoryError::MalformedInput { uid: 4, .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn non_finite_observation_time_is_rejected() {
        let mut store = StakeHistoryStore::new(&EngineConfig::default());
        store.update(&entry(4, 10.0), 0, 0.0).unwrap();
        for t in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = store.update(&entry(4, 9.0), 720, t).unwrap_err();
            assert!(matches!(
                err,
                HistoryError::MalformedInput {
                    uid: 4,
                    field: "observed_at",
                    ..
                }
            ));
        }
        assert_eq!(blocks(&store, 4), vec![0]);
    }

    // -------------------------------------------------------------------------
    // window retention
    // -------------------------------------------------------------------------

    #[test]
    fn window_retention_drops_old_entries_when_enough_remain() {
        let mut store = StakeHistoryStore::new(&small_config());
        for b in (100..=1_000).step_by(100) {
            store.update(&entry(1, 10.0), b, 0.0).unwrap();
        }
        // cutoff = 1000 - 500 = 500; entries > 500 are 600..=1000.
        assert_eq!(blocks(&store, 1), vec![600, 700, 800, 900, 1_000]);
    }

    #[test]
    fn window_retention_keeps_floor_when_sparse() {
        let mut store = StakeHistoryStore::new(&small_config());
        store.update(&entry(1, 10.0), 100, 0.0).unwrap();
        store.update(&entry(1, 10.0), 200, 0.0).unwrap();
        store.update(&entry(1, 10.0), 300, 0.0).unwrap();
        store.update(&entry(1, 10.0), 400, 0.0).unwrap();
        // Long gap: only one entry inside the window at 5000.
        store.update(&entry(1, 10.0), 5_000, 0.0).unwrap();
        assert_eq!(blocks(&store, 1), vec![300, 400, 5_000]);
    }

    #[test]
    fn retention_runs_on_unscheduled_blocks() {
        let mut store = StakeHistoryStore::new(&small_config());
        for b in [100, 200, 300, 400] {
            store.update(&entry(1, 10.0), b, 0.0).unwrap();
        }
        let out = store.update(&entry(1, 10.0), 950, 0.0).unwrap();
        assert_eq!(out, UpdateOutcome::NotScheduled { pruned: 1 });
        assert_eq!(blocks(&store, 1), vec![200, 300, 400]);
    }

    #[test]
    fn early_blocks_have_no_cutoff() {
        let mut store = StakeHistoryStore::new(&EngineConfig::default());
        store.update(&entry(1, 10.0), 0, 0.0).unwrap();
        store.update(&entry(1, 10.0), 720, 0.0).unwrap();
        assert_eq!(blocks(&store, 1), vec![0, 720]);
    }

    // -------------------------------------------------------------------------
    // insert_history
    // -------------------------------------------------------------------------

    #[test]
    fn insert_history_rejects_duplicate_blocks() {
        let mut store = StakeHistoryStore::new(&EngineConfig::default());
        let err = store
            .insert_history(9, vec![snap(10, 1.0, 0.0), snap(10, 2.0, 0.0)])
            .unwrap_err();
        assert_eq!(
            err,
            HistoryError::NonIncreasingBlock {
                uid: 9,
                block: 10,
                previous: 10
            }
        );
        assert!(store.history(9).is_none());
    }

    #[test]
    fn insert_empty_history_removes_uid() {
        let mut store = StakeHistoryStore::new(&EngineConfig::default());
        store.insert_history(9, vec![snap(10, 1.0, 0.0)]).unwrap();
        store.insert_history(9, Vec::new()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn from_histories_reports_rejected_series() {
        let mut map = HistoryMap::new();
        map.insert(1, vec![snap(10, 1.0, 0.0), snap(20, 1.0, 0.0)]);
        map.insert(2, vec![snap(20, 1.0, 0.0), snap(10, 1.0, 0.0)]);
        let (store, rejected) = StakeHistoryStore::from_histories(&EngineConfig::default(), map);
        assert_eq!(store.len(), 1);
        assert_eq!(rejected.len(), 1);
    }

    // -------------------------------------------------------------------------
    // cleanup
    // -------------------------------------------------------------------------

    #[test]
    fn cleanup_keeps_fresh_entries_when_plentiful() {
        let mut store = StakeHistoryStore::new(&small_config());
        // 6 entries; observed_at 0..=500 step 100. now=1200 → cutoff 200.
        let series: Vec<_> = (0..6).map(|i| snap(i * 10 + 10, 1.0, i as f64 * 100.0)).collect();
        store.insert_history(1, series).unwrap();
        let report = store.cleanup(1_200.0);
        // fresh (> 200): 300, 400, 500 → 3 < 4, so keep newest 4.
        assert_eq!(store.snapshot_count(1), 4);
        assert_eq!(report.dropped_entries, 2);

        let series: Vec<_> = (0..8).map(|i| snap(i * 10 + 10, 1.0, 500.0 + i as f64 * 100.0)).collect();
        store.insert_history(2, series).unwrap();
        // now=1600 → cutoff 600: fresh entries are 700..=1200 → 6 ≥ 4.
        store.cleanup(1_600.0);
        assert_eq!(store.snapshot_count(2), 6);
    }

    #[test]
    fn cleanup_keeps_everything_below_floor() {
        let mut store = StakeHistoryStore::new(&small_config());
        store
            .insert_history(1, vec![snap(10, 1.0, 0.0), snap(20, 1.0, 1.0), snap(30, 1.0, 2.0)])
            .unwrap();
        let report = store.cleanup(1_000_000.0);
        assert_eq!(store.snapshot_count(1), 3);
        assert_eq!(report.dropped_entries, 0);
        assert_eq!(report.tracked, 1);
        assert!(report.removed_uids.is_empty());
    }

    #[test]
    fn cleanup_removes_uids_left_empty() {
        let mut store = StakeHistoryStore::new(&EngineConfig {
            history_min_entries: 0,
            ..small_config()
        });
        store.insert_history(5, vec![snap(10, 1.0, 0.0)]).unwrap();
        store.insert_history(6, vec![snap(10, 1.0, 5_000.0)]).unwrap();
        let report = store.cleanup(5_500.0);
        assert_eq!(report.removed_uids, vec![5]);
        assert_eq!(report.tracked, 1);
        assert!(store.history(5).is_none());
    }

    // -------------------------------------------------------------------------
    // Properties
    // -------------------------------------------------------------------------

    proptest! {
        #[test]
        fn blocks_stay_strictly_increasing(
            steps in proptest::collection::vec((0u64..400, 0.0f64..1_000.0), 1..80),
        ) {
            let mut store = StakeHistoryStore::new(&small_config());
            let mut block = 0u64;
            for (delta, stake) in steps {
                // Allow repeats and regressions to exercise the stale path.
                block = if delta % 7 == 0 { block.saturating_sub(delta) } else { block + delta };
                store.update(&entry(1, stake), block, 0.0).unwrap();
                let h = store.history(1).unwrap();
                for pair in h.windows(2) {
                    prop_assert!(pair[0].block < pair[1].block);
                }
            }
        }

        #[test]
        fn retained_entries_are_in_window_or_floor(
            deltas in proptest::collection::vec(1u64..300, 1..60),
        ) {
            let cfg = small_config();
            let mut store = StakeHistoryStore::new(&cfg);
            let mut block = 0u64;
            for d in deltas {
                block += d;
                store.update(&entry(1, 5.0), block, 0.0).unwrap();
                let h = store.history(1).unwrap();
                let cutoff = block.checked_sub(cfg.analysis_lookback_blocks);
                let n = h.len();
                for (i, s) in h.iter().enumerate() {
                    let in_window = cutoff.is_none_or(|c| s.block > c);
                    let in_floor = n - i <= cfg.min_snapshots_for_analysis;
                    prop_assert!(in_window || in_floor);
                }
            }
        }
    }
}
