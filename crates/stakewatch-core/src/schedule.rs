//! Block-height sampling schedule.
//!
//! The schedule is the only synchronization mechanism between independent
//! validators: every node evaluating the same block height makes the same
//! sampling decision, so every node records the same snapshots regardless of
//! when its own scoring loop happens to run.

use serde::{Deserialize, Serialize};

/// Returns `true` when `current_block` is a synchronized sampling point.
///
/// An `interval` of zero never samples.
///
/// # Examples
///
/// ```
/// use stakewatch_core::schedule::should_snapshot;
///
/// assert!(should_snapshot(1440, 720));
/// assert!(!should_snapshot(1441, 720));
/// assert!(should_snapshot(0, 720));
/// assert!(!should_snapshot(720, 0));
/// ```
pub fn should_snapshot(current_block: u64, interval: u64) -> bool {
    current_block.checked_rem(interval) == Some(0)
}

/// Fixed-interval snapshot schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotScheduler {
    interval: u64,
}

impl SnapshotScheduler {
    pub fn new(interval: u64) -> Self {
        Self { interval }
    }

    /// Whether a snapshot should be taken at `block` for an entity that
    /// already has `history_len` snapshots. Empty histories always sample.
    pub fn should_snapshot(&self, block: u64, history_len: usize) -> bool {
        history_len == 0 || should_snapshot(block, self.interval)
    }

    /// First sampling point strictly after `block`, or `None` on overflow or
    /// a zero interval.
    ///
    /// # Examples
    ///
    /// ```
    /// use stakewatch_core::schedule::SnapshotScheduler;
    ///
    /// let s = SnapshotScheduler::new(720);
    /// assert_eq!(s.next_after(1000), Some(1440));
    /// assert_eq!(s.next_after(1440), Some(2160));
    /// ```
    pub fn next_after(&self, block: u64) -> Option<u64> {
        if self.interval == 0 {
            return None;
        }
        (block / self.interval)
            .checked_add(1)?
            .checked_mul(self.interval)
    }
}
