//! Protocol constants. Block-derived durations assume ~100 second blocks.

/// Blocks between synchronized snapshots (~20 hours).
pub const SNAPSHOT_INTERVAL_BLOCKS: u64 = 720;

/// Blocks of history considered by the detector and by window retention (~8 days).
pub const ANALYSIS_LOOKBACK_BLOCKS: u64 = 7_200;

/// Retention floor: the newest snapshots always kept regardless of block age.
pub const MIN_SNAPSHOTS_FOR_ANALYSIS: usize = 10;

/// Minimum snapshots before the detector will produce any verdict.
pub const MIN_ANALYSIS_POINTS: usize = 3;

/// Upper bound on the moving-average window, in snapshots.
pub const MOVING_AVERAGE_WINDOW: usize = 7;

/// Approximate blocks produced per day.
pub const BLOCKS_PER_DAY: u64 = 864;

/// Approximate blocks produced per hour.
pub const BLOCKS_PER_HOUR: u64 = 36;

/// New-entrant guard: minimum snapshot count before a penalty may apply.
pub const MIN_SNAPSHOTS_FOR_PENALTY: usize = 5;

/// New-entrant guard: minimum blocks since the first snapshot (~2 days).
pub const MIN_BLOCKS_FOR_PENALTY: u64 = 1_728;

/// Endpoint decline threshold in percent, before the adaptive multiplier.
pub const BASE_THRESHOLD_PCT: f64 = 5.0;

/// Moving-average decline threshold in percent, before the adaptive multiplier.
pub const BASE_MA_THRESHOLD_PCT: f64 = 3.0;

/// Garbage collection drops snapshots older than this many seconds (7 days)...
pub const HISTORY_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// ...unless fewer than this many entries would remain.
pub const HISTORY_MIN_ENTRIES: usize = 15;

/// Minimum wall-clock spacing between batched history saves.
pub const SAVE_INTERVAL_SECS: u64 = 60 * 60;

/// Minimum wall-clock spacing between garbage collection passes.
pub const CLEANUP_INTERVAL_SECS: u64 = 6 * 60 * 60;

/// Default network identifier, used to name the persisted history file.
pub const DEFAULT_NETUID: u16 = 49;

/// Adaptive threshold multiplier for a trend spanning `days` days.
///
/// Short observation windows use stricter (lower) multipliers: a large swing
/// over a few hours is more likely a deliberate dump than natural variance.
///
/// | Days analyzed | Multiplier |
/// |---------------|------------|
/// | ≥ 7           | 1.00       |
/// | [3, 7)        | 0.85       |
/// | [1, 3)        | 0.70       |
/// | < 1           | 0.50       |
///
/// # Examples
///
/// ```
/// use stakewatch_core::constants::threshold_multiplier;
///
/// assert_eq!(threshold_multiplier(10.0), 1.0);
/// assert_eq!(threshold_multiplier(3.0), 0.85);
/// assert_eq!(threshold_multiplier(2.0), 0.70);
/// assert_eq!(threshold_multiplier(0.5), 0.50);
/// ```
pub fn threshold_multiplier(days: f64) -> f64 {
    if days >= 7.0 {
        1.0
    } else if days >= 3.0 {
        0.85
    } else if days >= 1.0 {
        0.70
    } else {
        0.50
    }
}
