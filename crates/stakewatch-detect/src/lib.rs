//! # stakewatch-detect — Over-selling detection and penalty engine.
//!
//! Every decision is keyed off block height so that independent validators
//! holding the same stake history reach identical verdicts.
//!
//! - **Anomaly detection**: endpoint and moving-average stake decline over a
//!   lookback window, judged against thresholds that tighten for short spans.
//! - **New-entrant guard**: no judgment before 5 snapshots and 1728 blocks.
//! - **Penalty ledger**: fixed severity brackets, one active record per uid,
//!   replaced on re-violation and expired by block height.
//! - **Score adjustment**: proportional score cuts with the forfeited total
//!   reported to the caller.
//! - **Engine**: composes the above into one synchronous scoring cycle.

pub mod adjust;
pub mod detector;
pub mod engine;
pub mod guard;
pub mod penalty;

pub use adjust::{ScoreAdjustment, ScoreReduction, ScoreVector, adjust_scores};
pub use detector::{AnomalyDetector, StakeAnalysis};
pub use engine::{CycleEvent, CycleReport, Engine};
pub use guard::{NewEntrantGuard, Protection};
pub use penalty::{PenaltyLedger, PenaltyRecord, PenaltySchedule, PenaltyStatus, PenaltySummary, Violation};
