//! The scoring-cycle engine.
//!
//! [`Engine`] owns every piece of mutable state (history store, penalty
//! ledger, persistence backend) and advances it once per external scoring
//! cycle through [`Engine::run_cycle`]:
//!
//! 1. record the ledger snapshot into the history store
//! 2. skip protected new entrants
//! 3. analyze the rest and classify violations
//! 4. open penalties, then expire the ones that have run out
//! 5. reduce the scores of penalized uids
//! 6. best-effort cleanup and persistence
//!
//! Nothing in a cycle can fail the caller. Per-entity problems become
//! [`CycleEvent::EntitySkipped`], persistence problems become
//! [`CycleEvent::PersistFailed`]. A non-finite observation time is replaced
//! by the last finite one ([`CycleEvent::ObservedAtRejected`]).

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use stakewatch_core::config::EngineConfig;
use stakewatch_core::error::{ConfigError, DataUnavailable, PersistError};
use stakewatch_core::history::{CleanupReport, StakeHistoryStore, UpdateOutcome};
use stakewatch_core::traits::HistoryBackend;
use stakewatch_core::types::{LedgerSnapshot, StakeSnapshot, Uid};

use crate::adjust::{ScoreReduction, ScoreVector, adjust_scores};
use crate::detector::{AnomalyDetector, StakeAnalysis};
use crate::guard::{NewEntrantGuard, Protection};
use crate::penalty::{PenaltyLedger, PenaltyRecord, PenaltyStatus, PenaltySummary, Violation};

/// Something that happened during a cycle, for the caller's logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum CycleEvent {
    EntitySkipped { uid: Uid, reason: String },
    ObservedAtRejected { fallback: Option<f64> },
    ViolationDetected(Violation),
    PenaltyApplied(PenaltyRecord),
    PenaltyExpired(PenaltyRecord),
    ScoreReduced(ScoreReduction),
    HistoryCleaned(CleanupReport),
    HistoryPersisted { tracked: usize, backend: String },
    PersistFailed { error: String },
}

/// Output of one [`Engine::run_cycle`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub block: u64,
    pub observed_at: f64,
    pub snapshots_recorded: usize,
    pub tracked_entities: usize,
    pub adjusted_scores: ScoreVector,
    pub total_forfeited: f64,
    pub events: Vec<CycleEvent>,
}

impl CycleReport {
    pub fn violations(&self) -> impl Iterator<Item = &Violation> {
        self.events.iter().filter_map(|e| match e {
            CycleEvent::ViolationDetected(v) => Some(v),
            _ => None,
        })
    }
}

pub struct Engine<B: HistoryBackend> {
    config: EngineConfig,
    store: StakeHistoryStore,
    detector: AnomalyDetector,
    guard: NewEntrantGuard,
    ledger: PenaltyLedger,
    backend: B,
    dirty: bool,
    last_saved_at: Option<f64>,
    last_cleanup_at: Option<f64>,
    last_observed_at: Option<f64>,
}

impl<B: HistoryBackend> Engine<B> {
    /// Validate `config` and seed the store from `backend`.
    ///
    /// A backend that fails to load yields an empty store; only an invalid
    /// configuration is an error.
    pub fn open(config: EngineConfig, mut backend: B) -> Result<Self, ConfigError> {
        config.validate()?;

        let loaded = match backend.load() {
            Ok(histories) => histories,
            Err(e) => {
                error!(backend = %backend.describe(), error = %e, "failed to load stake history, starting fresh");
                Default::default()
            }
        };
        let (store, rejected) = StakeHistoryStore::from_histories(&config, loaded);
        for e in &rejected {
            warn!(error = %e, "discarded persisted history");
        }
        if store.is_empty() {
            info!(backend = %backend.describe(), "no existing stake history, starting fresh");
        } else {
            info!(backend = %backend.describe(), tracked = store.len(), "loaded stake history");
        }

        let last_observed_at = store
            .histories()
            .values()
            .flatten()
            .map(|s| s.observed_at)
            .filter(|t| t.is_finite())
            .reduce(f64::max);

        Ok(Self {
            detector: AnomalyDetector::new(&config),
            guard: NewEntrantGuard::new(&config),
            ledger: PenaltyLedger::new(&config),
            store,
            config,
            backend,
            dirty: !rejected.is_empty(),
            last_saved_at: None,
            last_cleanup_at: None,
            last_observed_at,
        })
    }

    /// Run one scoring cycle against `snapshot` and `scores`.
    pub fn run_cycle(&mut self, snapshot: &LedgerSnapshot, scores: &ScoreVector) -> CycleReport {
        let block = snapshot.block;
        let mut events = Vec::new();
        let mut observed = BTreeSet::new();
        let mut recorded = 0;

        let observed_at = if snapshot.observed_at.is_finite() {
            self.last_observed_at = Some(snapshot.observed_at);
            snapshot.observed_at
        } else {
            let fallback = self.last_observed_at;
            warn!(block, observed_at = snapshot.observed_at, ?fallback, "non-finite observation time");
            events.push(CycleEvent::ObservedAtRejected { fallback });
            // With no fallback every entry is rejected by the store below.
            fallback.unwrap_or(snapshot.observed_at)
        };

        for entry in &snapshot.entries {
            match self.store.update(entry, block, observed_at) {
                Ok(UpdateOutcome::Appended) => {
                    recorded += 1;
                    observed.insert(entry.uid);
                }
                Ok(UpdateOutcome::NotScheduled { pruned }) => {
                    if pruned > 0 {
                        debug!(uid = entry.uid, block, pruned, "window retention pruned history");
                        self.dirty = true;
                    }
                    observed.insert(entry.uid);
                }
                Ok(UpdateOutcome::Stale { last_block }) => {
                    debug!(uid = entry.uid, block, last_block, "already recorded at or after this block");
                    observed.insert(entry.uid);
                }
                Err(e) => {
                    warn!(uid = entry.uid, error = %e, "skipping entity");
                    events.push(CycleEvent::EntitySkipped {
                        uid: entry.uid,
                        reason: e.to_string(),
                    });
                }
            }
        }
        if recorded > 0 {
            self.dirty = true;
        }

        let violations = self.detect_violations(observed.iter().copied(), block);
        if violations.is_empty() {
            debug!(block, analyzed = observed.len(), "no over-selling violations");
        } else {
            warn!(block, count = violations.len(), "over-selling violations detected");
        }
        events.extend(violations.iter().cloned().map(CycleEvent::ViolationDetected));

        let applied = self.ledger.apply(&violations, block, observed_at);
        events.extend(applied.into_iter().map(CycleEvent::PenaltyApplied));
        let expired = self.ledger.expire(block);
        events.extend(expired.into_iter().map(CycleEvent::PenaltyExpired));

        let adjustment = adjust_scores(scores, &self.ledger, block);
        events.extend(adjustment.reductions.into_iter().map(CycleEvent::ScoreReduced));

        if observed_at.is_finite() {
            if let Some(report) = self.maybe_cleanup(observed_at) {
                events.push(CycleEvent::HistoryCleaned(report));
            }
            if let Some(event) = self.maybe_persist(observed_at) {
                events.push(event);
            }
        }

        CycleReport {
            block,
            observed_at,
            snapshots_recorded: recorded,
            tracked_entities: self.store.len(),
            adjusted_scores: adjustment.scores,
            total_forfeited: adjustment.total_forfeited,
            events,
        }
    }

    /// Analyze each uid at `current_block` and classify the violations.
    /// Protected uids and uids without enough data are skipped.
    pub fn detect_violations(&self, uids: impl IntoIterator<Item = Uid>, current_block: u64) -> Vec<Violation> {
        let schedule = self.ledger.schedule();
        let mut violations = Vec::new();
        for uid in uids {
            let history = self.store.history(uid);
            let protection = self.guard.check(history, current_block);
            if protection.is_protected() {
                debug!(uid, ?protection, "new entrant protected");
                continue;
            }
            let analysis = match self.detector.analyze(uid, history, current_block) {
                Ok(a) => a,
                Err(e) => {
                    debug!(uid, error = %e, "no verdict");
                    continue;
                }
            };
            if !analysis.is_violation {
                continue;
            }
            match Violation::from_analysis(&analysis, schedule) {
                Some(v) => {
                    warn!(
                        uid,
                        level = %v.level,
                        stake_change_pct = v.stake_change_percent,
                        ma_change_pct = v.moving_avg_change_percent,
                        stake_change = v.stake_change,
                        "over-selling violation"
                    );
                    violations.push(v);
                }
                None => debug!(uid, pct = analysis.stake_change_percent, "decline outside every bracket"),
            }
        }
        violations
    }

    /// Full analysis of `uid` as seen at `current_block`, ignoring protection.
    pub fn analyze(&self, uid: Uid, current_block: u64) -> Result<StakeAnalysis, DataUnavailable> {
        self.detector.analyze(uid, self.store.history(uid), current_block)
    }

    pub fn protection(&self, uid: Uid, current_block: u64) -> Protection {
        self.guard.check(self.store.history(uid), current_block)
    }

    pub fn penalty_status(&self, uid: Uid, current_block: u64) -> Option<PenaltyStatus> {
        self.ledger.status(uid, current_block)
    }

    pub fn penalty_summary(&self) -> PenaltySummary {
        self.ledger.summary(self.store.len())
    }

    pub fn history(&self, uid: Uid) -> Option<&[StakeSnapshot]> {
        self.store.history(uid)
    }

    /// Age-based garbage collection against wall-clock `now`.
    pub fn cleanup(&mut self, now: f64) -> CleanupReport {
        let report = self.store.cleanup(now);
        if report.dropped_entries > 0 || !report.removed_uids.is_empty() {
            self.dirty = true;
        }
        self.last_cleanup_at = Some(now);
        report
    }

    /// Save unconditionally and flush the backend.
    pub fn flush(&mut self) -> Result<(), PersistError> {
        self.backend.save(self.store.histories())?;
        self.backend.flush()?;
        self.dirty = false;
        info!(backend = %self.backend.describe(), tracked = self.store.len(), "stake history saved");
        Ok(())
    }

    fn maybe_cleanup(&mut self, now: f64) -> Option<CleanupReport> {
        let interval = self.config.cleanup_interval_secs as f64;
        if self.last_cleanup_at.is_some_and(|t| now - t < interval) {
            return None;
        }
        Some(self.cleanup(now))
    }

    fn maybe_persist(&mut self, now: f64) -> Option<CycleEvent> {
        let interval = self.config.save_interval_secs as f64;
        if !self.dirty || self.last_saved_at.is_some_and(|t| now - t < interval) {
            return None;
        }
        self.last_saved_at = Some(now);
        let event = match self.backend.save(self.store.histories()) {
            Ok(()) => {
                self.dirty = false;
                debug!(backend = %self.backend.describe(), tracked = self.store.len(), "stake history saved");
                CycleEvent::HistoryPersisted {
                    tracked: self.store.len(),
                    backend: self.backend.describe(),
                }
            }
            Err(e) => {
                error!(backend = %self.backend.describe(), error = %e, "failed to save stake history");
                CycleEvent::PersistFailed { error: e.to_string() }
            }
        };
        Some(event)
    }

    pub fn store(&self) -> &StakeHistoryStore {
        &self.store
    }

    pub fn ledger(&self) -> &PenaltyLedger {
        &self.ledger
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether the in-memory store has changes not yet saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}
