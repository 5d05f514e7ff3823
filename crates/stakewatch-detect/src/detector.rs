//! Adaptive-threshold stake decline detector.
//!
//! Compares the newest snapshot in the analysis window against both the
//! oldest one (endpoint trend) and a short moving average (sustained trend).
//! A violation needs both to show a decline beyond thresholds that tighten as
//! the observed span shrinks. All inputs are block-keyed snapshots, so two
//! validators holding the same history reach the same verdict bit for bit.

use serde::Serialize;

use stakewatch_core::config::EngineConfig;
use stakewatch_core::constants::threshold_multiplier;
use stakewatch_core::error::DataUnavailable;
use stakewatch_core::types::{StakeSnapshot, Uid};

/// Every intermediate quantity of one analysis, kept for audit logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StakeAnalysis {
    pub uid: Uid,
    pub initial_stake: f64,
    pub current_stake: f64,
    pub moving_avg_stake: f64,
    pub avg_emission: f64,
    pub stake_change: f64,
    pub stake_change_percent: f64,
    pub moving_avg_change: f64,
    pub moving_avg_change_percent: f64,
    pub data_points: usize,
    pub ma_window: usize,
    pub initial_block: u64,
    pub final_block: u64,
    pub blocks_analyzed: u64,
    pub days_analyzed: f64,
    pub threshold_multiplier: f64,
    pub adaptive_threshold: f64,
    pub adaptive_ma_threshold: f64,
    pub is_violation: bool,
}

/// The production detector, parameterised from [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    lookback_blocks: u64,
    min_points: usize,
    ma_window: usize,
    blocks_per_day: u64,
    base_threshold_pct: f64,
    base_ma_threshold_pct: f64,
}

impl AnomalyDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            lookback_blocks: config.analysis_lookback_blocks,
            min_points: config.min_analysis_points,
            ma_window: config.moving_average_window,
            blocks_per_day: config.blocks_per_day,
            base_threshold_pct: config.base_threshold_pct,
            base_ma_threshold_pct: config.base_ma_threshold_pct,
        }
    }

    /// Analyze `history` (oldest first, strictly increasing blocks) as seen
    /// at `current_block`.
    ///
    /// Prefers snapshots inside the lookback window and falls back to the
    /// full history when the window holds too few points.
    pub fn analyze(
        &self,
        uid: Uid,
        history: Option<&[StakeSnapshot]>,
        current_block: u64,
    ) -> Result<StakeAnalysis, DataUnavailable> {
        let history = match history {
            Some(h) if !h.is_empty() => h,
            _ => return Err(DataUnavailable::UnknownUid(uid)),
        };
        if history.len() < self.min_points {
            return Err(DataUnavailable::InsufficientSnapshots {
                uid,
                have: history.len(),
                need: self.min_points,
            });
        }

        let selected = self.select(history, current_block);
        let count = selected.len();

        let ma_window = self.ma_window.min(count);
        let recent = &selected[count - ma_window..];
        let moving_avg_stake = mean(recent.iter().map(|s| s.stake), ma_window);
        let avg_emission = mean(recent.iter().map(|s| s.emission), ma_window);

        let initial = &selected[0];
        let current = &selected[count - 1];
        let blocks_analyzed = current.block - initial.block;
        let days_analyzed = if blocks_analyzed > 0 && self.blocks_per_day > 0 {
            blocks_analyzed as f64 / self.blocks_per_day as f64
        } else {
            0.0
        };

        let multiplier = threshold_multiplier(days_analyzed);
        let adaptive_threshold = self.base_threshold_pct * multiplier;
        let adaptive_ma_threshold = self.base_ma_threshold_pct * multiplier;

        let stake_change = current.stake - initial.stake;
        let stake_change_percent = percent_of(stake_change, initial.stake);
        let moving_avg_change = current.stake - moving_avg_stake;
        let moving_avg_change_percent = percent_of(moving_avg_change, moving_avg_stake);

        // Endpoint decline AND moving-average decline: a single noisy
        // snapshot cannot trigger a violation on its own.
        let is_violation = stake_change < 0.0
            && stake_change_percent.abs() > adaptive_threshold
            && moving_avg_change_percent < -adaptive_ma_threshold;

        Ok(StakeAnalysis {
            uid,
            initial_stake: initial.stake,
            current_stake: current.stake,
            moving_avg_stake,
            avg_emission,
            stake_change,
            stake_change_percent,
            moving_avg_change,
            moving_avg_change_percent,
            data_points: count,
            ma_window,
            initial_block: initial.block,
            final_block: current.block,
            blocks_analyzed,
            days_analyzed,
            threshold_multiplier: multiplier,
            adaptive_threshold,
            adaptive_ma_threshold,
            is_violation,
        })
    }

    fn select<'a>(&self, history: &'a [StakeSnapshot], current_block: u64) -> &'a [StakeSnapshot] {
        let windowed = match current_block.checked_sub(self.lookback_blocks) {
            Some(start) => &history[history.partition_point(|s| s.block <= start)..],
            None => history,
        };
        if windowed.len() >= self.min_points {
            windowed
        } else {
            history
        }
    }
}

fn mean(values: impl Iterator<Item = f64>, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}

/// `change / base * 100`, or 0 when `base` is not positive.
fn percent_of(change: f64, base: f64) -> f64 {
    if base > 0.0 {
        change / base * 100.0
    } else {
        0.0
    }
}
