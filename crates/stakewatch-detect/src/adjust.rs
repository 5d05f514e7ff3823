//! Score reduction for penalized uids.
//!
//! The adjuster only computes how much score each active penalty removes.
//! Redistribution of the forfeited amount is left to the caller.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use stakewatch_core::types::{PenaltyLevel, Uid, parse_uid};

use crate::penalty::PenaltyLedger;

/// Upstream score vector keyed by numeric-string uid.
pub type ScoreVector = BTreeMap<String, f64>;

/// One applied reduction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreReduction {
    pub uid: Uid,
    pub level: PenaltyLevel,
    pub original: f64,
    pub adjusted: f64,
    pub forfeited: f64,
    pub remaining_blocks: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreAdjustment {
    pub scores: ScoreVector,
    pub total_forfeited: f64,
    pub reductions: Vec<ScoreReduction>,
}

/// Apply every penalty active at `current_block` to `scores`.
///
/// Keys that do not parse as a uid, uids without an active penalty, and
/// non-finite scores are copied through unchanged.
pub fn adjust_scores(scores: &ScoreVector, ledger: &PenaltyLedger, current_block: u64) -> ScoreAdjustment {
    let mut adjustment = ScoreAdjustment {
        scores: scores.clone(),
        ..ScoreAdjustment::default()
    };

    for (key, score) in adjustment.scores.iter_mut() {
        let uid = match parse_uid(key) {
            Ok(uid) => uid,
            Err(e) => {
                debug!(key = %key, error = %e, "score key passed through");
                continue;
            }
        };
        let Some(record) = ledger.active(uid, current_block) else {
            continue;
        };
        if !score.is_finite() {
            continue;
        }

        let original = *score;
        let adjusted = original * (1.0 - record.score_reduction);
        let forfeited = original - adjusted;
        *score = adjusted;
        adjustment.total_forfeited += forfeited;

        let remaining_blocks = record.end_block - current_block;
        info!(
            uid,
            level = %record.level,
            original,
            adjusted,
            remaining_blocks,
            "score reduced for over-selling"
        );
        adjustment.reductions.push(ScoreReduction {
            uid,
            level: record.level,
            original,
            adjusted,
            forfeited,
            remaining_blocks,
        });
    }

    adjustment
}
