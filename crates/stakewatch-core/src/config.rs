//! Engine configuration.
//!
//! [`EngineConfig`] carries every tunable the detection pipeline reads. All
//! fields default to the protocol constants so a partial config file (or none
//! at all) yields the standard network behaviour. Validators that diverge from
//! the defaults will also diverge in their verdicts.

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ConfigError;
use crate::types::PenaltyLevel;

/// One row of the penalty classification table.
///
/// A decline matches when `min_decrease <= decrease < max_decrease`; the
/// highest bracket also matches `decrease == max_decrease`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyBracket {
    pub level: PenaltyLevel,
    /// Lower bound of the stake decrease, as a fraction (0.05 = 5%).
    pub min_decrease: f64,
    pub max_decrease: f64,
    /// Fraction of the score forfeited while the penalty is active.
    pub score_reduction: f64,
    pub duration_hours: u64,
}

/// Standard Moderate / High / Extreme brackets.
pub fn default_penalty_brackets() -> Vec<PenaltyBracket> {
    vec![
        PenaltyBracket {
            level: PenaltyLevel::Moderate,
            min_decrease: 0.05,
            max_decrease: 0.15,
            score_reduction: 0.20,
            duration_hours: 6,
        },
        PenaltyBracket {
            level: PenaltyLevel::High,
            min_decrease: 0.15,
            max_decrease: 0.30,
            score_reduction: 0.40,
            duration_hours: 12,
        },
        PenaltyBracket {
            level: PenaltyLevel::Extreme,
            min_decrease: 0.30,
            max_decrease: 1.00,
            score_reduction: 0.60,
            duration_hours: 24,
        },
    ]
}

/// Tunables for history retention, detection, and penalties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub snapshot_interval_blocks: u64,
    pub analysis_lookback_blocks: u64,
    pub min_snapshots_for_analysis: usize,
    pub min_analysis_points: usize,
    pub moving_average_window: usize,
    pub blocks_per_day: u64,
    pub blocks_per_hour: u64,
    pub min_snapshots_for_penalty: usize,
    pub min_blocks_for_penalty: u64,
    pub base_threshold_pct: f64,
    pub base_ma_threshold_pct: f64,
    pub penalty_brackets: Vec<PenaltyBracket>,
    pub history_max_age_secs: u64,
    pub history_min_entries: usize,
    pub save_interval_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_blocks: SNAPSHOT_INTERVAL_BLOCKS,
            analysis_lookback_blocks: ANALYSIS_LOOKBACK_BLOCKS,
            min_snapshots_for_analysis: MIN_SNAPSHOTS_FOR_ANALYSIS,
            min_analysis_points: MIN_ANALYSIS_POINTS,
            moving_average_window: MOVING_AVERAGE_WINDOW,
            blocks_per_day: BLOCKS_PER_DAY,
            blocks_per_hour: BLOCKS_PER_HOUR,
            min_snapshots_for_penalty: MIN_SNAPSHOTS_FOR_PENALTY,
            min_blocks_for_penalty: MIN_BLOCKS_FOR_PENALTY,
            base_threshold_pct: BASE_THRESHOLD_PCT,
            base_ma_threshold_pct: BASE_MA_THRESHOLD_PCT,
            penalty_brackets: default_penalty_brackets(),
            history_max_age_secs: HISTORY_MAX_AGE_SECS,
            history_min_entries: HISTORY_MIN_ENTRIES,
            save_interval_secs: SAVE_INTERVAL_SECS,
            cleanup_interval_secs: CLEANUP_INTERVAL_SECS,
        }
    }
}

impl EngineConfig {
    /// Check internal consistency. Brackets must be sorted, non-overlapping,
    /// and carry reductions strictly between 0 and 1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("snapshot_interval_blocks", self.snapshot_interval_blocks),
            ("blocks_per_day", self.blocks_per_day),
            ("blocks_per_hour", self.blocks_per_hour),
            ("min_snapshots_for_analysis", self.min_snapshots_for_analysis as u64),
            ("min_analysis_points", self.min_analysis_points as u64),
            ("moving_average_window", self.moving_average_window as u64),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }

        for (field, value) in [
            ("base_threshold_pct", self.base_threshold_pct),
            ("base_ma_threshold_pct", self.base_ma_threshold_pct),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NotPositive {
                    field,
                    value: value.to_string(),
                });
            }
        }

        if self.penalty_brackets.is_empty() {
            return Err(ConfigError::NoBrackets);
        }
        let mut previous_max: Option<f64> = None;
        for bracket in &self.penalty_brackets {
            let r = bracket.score_reduction;
            if !(r > 0.0 && r < 1.0) {
                return Err(ConfigError::InvalidReduction {
                    level: bracket.level.to_string(),
                    value: r.to_string(),
                });
            }
            if !(bracket.min_decrease >= 0.0 && bracket.min_decrease < bracket.max_decrease) {
                return Err(ConfigError::InvalidBracket {
                    level: bracket.level.to_string(),
                    min: bracket.min_decrease.to_string(),
                    max: bracket.max_decrease.to_string(),
                });
            }
            if let Some(prev) = previous_max {
                if bracket.min_decrease < prev {
                    return Err(ConfigError::OverlappingBrackets(bracket.level.to_string()));
                }
            }
            previous_max = Some(bracket.max_decrease);
        }
        Ok(())
    }
}
