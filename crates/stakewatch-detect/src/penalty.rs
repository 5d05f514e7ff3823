//! Penalty classification and the per-uid penalty state machine.
//!
//! Each uid is either unpenalized or carries exactly one active
//! [`PenaltyRecord`]. A new violation overwrites the current record (there is
//! no escalation for repeat offenses), and a record is removed once the chain
//! reaches its `end_block`.
//!
//! ```text
//! NoPenalty --apply--> Active(level, end_block) --expire(block >= end_block)--> NoPenalty
//!                        ^            |
//!                        +---apply----+   (replace)
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use stakewatch_core::config::{EngineConfig, PenaltyBracket};
use stakewatch_core::types::{PenaltyLevel, Uid};

use crate::detector::StakeAnalysis;

/// Bracket table plus the block-time conversion used for durations.
#[derive(Debug, Clone)]
pub struct PenaltySchedule {
    brackets: Vec<PenaltyBracket>,
    blocks_per_hour: u64,
}

impl PenaltySchedule {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            brackets: config.penalty_brackets.clone(),
            blocks_per_hour: config.blocks_per_hour,
        }
    }

    /// Bracket for a fractional stake decrease (0.2 = 20%).
    ///
    /// Brackets are half-open `[min, max)`; the highest bracket also
    /// includes its upper bound. Declines matching no bracket return `None`.
    pub fn classify(&self, decrease: f64) -> Option<&PenaltyBracket> {
        let last = self.brackets.len().checked_sub(1)?;
        self.brackets.iter().enumerate().find_map(|(i, b)| {
            let below_max = decrease < b.max_decrease || (i == last && decrease <= b.max_decrease);
            (decrease >= b.min_decrease && below_max).then_some(b)
        })
    }

    pub fn bracket(&self, level: PenaltyLevel) -> Option<&PenaltyBracket> {
        self.brackets.iter().find(|b| b.level == level)
    }

    pub fn duration_blocks(&self, bracket: &PenaltyBracket) -> u64 {
        bracket.duration_hours.saturating_mul(self.blocks_per_hour)
    }

    pub fn blocks_per_hour(&self) -> u64 {
        self.blocks_per_hour
    }
}

/// A detected over-selling violation with its classified severity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub uid: Uid,
    pub level: PenaltyLevel,
    pub stake_change_percent: f64,
    pub stake_change: f64,
    pub initial_stake: f64,
    pub current_stake: f64,
    pub avg_emission: f64,
    pub moving_avg_change_percent: f64,
    pub data_points: usize,
    pub blocks_analyzed: u64,
    pub initial_block: u64,
    pub final_block: u64,
}

impl Violation {
    /// Classify a violating analysis. Returns `None` when the analysis is not
    /// a violation or its decline falls outside every bracket.
    pub fn from_analysis(analysis: &StakeAnalysis, schedule: &PenaltySchedule) -> Option<Self> {
        if !analysis.is_violation {
            return None;
        }
        let decrease = analysis.stake_change_percent.abs() / 100.0;
        let bracket = schedule.classify(decrease)?;
        Some(Self {
            uid: analysis.uid,
            level: bracket.level,
            stake_change_percent: analysis.stake_change_percent,
            stake_change: analysis.stake_change,
            initial_stake: analysis.initial_stake,
            current_stake: analysis.current_stake,
            avg_emission: analysis.avg_emission,
            moving_avg_change_percent: analysis.moving_avg_change_percent,
            data_points: analysis.data_points,
            blocks_analyzed: analysis.blocks_analyzed,
            initial_block: analysis.initial_block,
            final_block: analysis.final_block,
        })
    }
}

/// An active penalty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PenaltyRecord {
    pub uid: Uid,
    pub level: PenaltyLevel,
    pub score_reduction: f64,
    pub duration_hours: u64,
    pub duration_blocks: u64,
    pub start_block: u64,
    pub end_block: u64,
    pub stake_change_percent: f64,
    pub stake_change: f64,
    pub initial_stake: f64,
    pub current_stake: f64,
    /// Wall-clock time of application, unix seconds.
    pub applied_at: f64,
}

impl PenaltyRecord {
    pub fn is_active_at(&self, block: u64) -> bool {
        block < self.end_block
    }
}

/// Read-only projection of an active penalty at a given block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PenaltyStatus {
    pub uid: Uid,
    pub level: PenaltyLevel,
    pub score_reduction: f64,
    pub remaining_blocks: u64,
    pub remaining_hours: f64,
    pub end_block: u64,
    pub stake_change_percent: f64,
    pub stake_change: f64,
    pub initial_stake: f64,
    pub current_stake: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PenaltySummary {
    pub active_penalties: usize,
    pub tracked_entities: usize,
    pub level_counts: BTreeMap<PenaltyLevel, usize>,
    pub active_uids: Vec<Uid>,
}

/// Per-uid penalty state.
#[derive(Debug, Clone)]
pub struct PenaltyLedger {
    schedule: PenaltySchedule,
    records: BTreeMap<Uid, PenaltyRecord>,
}

impl PenaltyLedger {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            schedule: PenaltySchedule::new(config),
            records: BTreeMap::new(),
        }
    }

    pub fn schedule(&self) -> &PenaltySchedule {
        &self.schedule
    }

    /// Open a penalty for every violation, replacing any existing record for
    /// the same uid. Returns the records that were written.
    pub fn apply(&mut self, violations: &[Violation], current_block: u64, applied_at: f64) -> Vec<PenaltyRecord> {
        let mut applied = Vec::with_capacity(violations.len());
        for v in violations {
            let Some(bracket) = self.schedule.bracket(v.level) else {
                warn!(uid = v.uid, level = %v.level, "no bracket configured for violation level");
                continue;
            };
            let duration_blocks = self.schedule.duration_blocks(bracket);
            let record = PenaltyRecord {
                uid: v.uid,
                level: v.level,
                score_reduction: bracket.score_reduction,
                duration_hours: bracket.duration_hours,
                duration_blocks,
                start_block: current_block,
                end_block: current_block.saturating_add(duration_blocks),
                stake_change_percent: v.stake_change_percent,
                stake_change: v.stake_change,
                initial_stake: v.initial_stake,
                current_stake: v.current_stake,
                applied_at,
            };
            warn!(
                uid = v.uid,
                level = %v.level,
                reduction_pct = bracket.score_reduction * 100.0,
                hours = bracket.duration_hours,
                end_block = record.end_block,
                stake_change_pct = v.stake_change_percent,
                "over-selling penalty applied"
            );
            if let Some(previous) = self.records.insert(v.uid, record.clone()) {
                info!(uid = v.uid, previous_level = %previous.level, "replaced existing penalty");
            }
            applied.push(record);
        }
        applied
    }

    /// Remove and return every record whose `end_block` has been reached.
    pub fn expire(&mut self, current_block: u64) -> Vec<PenaltyRecord> {
        let expired_uids: Vec<Uid> = self
            .records
            .values()
            .filter(|r| !r.is_active_at(current_block))
            .map(|r| r.uid)
            .collect();
        let mut expired = Vec::with_capacity(expired_uids.len());
        for uid in expired_uids {
            if let Some(record) = self.records.remove(&uid) {
                info!(uid, block = current_block, "over-selling penalty expired");
                expired.push(record);
            }
        }
        expired
    }

    /// Record for `uid` if it is still active at `current_block`.
    pub fn active(&self, uid: Uid, current_block: u64) -> Option<&PenaltyRecord> {
        self.records.get(&uid).filter(|r| r.is_active_at(current_block))
    }

    pub fn status(&self, uid: Uid, current_block: u64) -> Option<PenaltyStatus> {
        let r = self.active(uid, current_block)?;
        let remaining_blocks = r.end_block - current_block;
        let remaining_hours = match self.schedule.blocks_per_hour() {
            0 => 0.0,
            bph => remaining_blocks as f64 / bph as f64,
        };
        Some(PenaltyStatus {
            uid,
            level: r.level,
            score_reduction: r.score_reduction,
            remaining_blocks,
            remaining_hours,
            end_block: r.end_block,
            stake_change_percent: r.stake_change_percent,
            stake_change: r.stake_change,
            initial_stake: r.initial_stake,
            current_stake: r.current_stake,
        })
    }

    pub fn summary(&self, tracked_entities: usize) -> PenaltySummary {
        let mut level_counts = BTreeMap::new();
        for r in self.records.values() {
            *level_counts.entry(r.level).or_insert(0) += 1;
        }
        PenaltySummary {
            active_penalties: self.records.len(),
            tracked_entities,
            level_counts,
            active_uids: self.records.keys().copied().collect(),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &PenaltyRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
