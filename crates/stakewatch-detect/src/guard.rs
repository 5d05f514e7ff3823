//! New-entrant protection.
//!
//! An entity's first snapshot is its baseline; judging it before there is
//! enough history would punish ordinary early volatility. Judgment requires
//! both a minimum sample size and a minimum span of chain time since the
//! first snapshot.

use serde::Serialize;

use stakewatch_core::config::EngineConfig;
use stakewatch_core::types::StakeSnapshot;

/// Why an entity is (or is not) shielded from penalties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "protection")]
pub enum Protection {
    /// Old enough and sampled enough to be judged.
    Eligible,
    NoHistory,
    TooFewSnapshots { have: usize, need: usize },
    /// Fewer than the required blocks since the first snapshot. `since_first`
    /// is `None` when the query block precedes the first snapshot.
    TooRecent { since_first: Option<u64>, need: u64 },
}

impl Protection {
    pub fn is_protected(&self) -> bool {
        !matches!(self, Protection::Eligible)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NewEntrantGuard {
    min_snapshots: usize,
    min_blocks: u64,
}

impl NewEntrantGuard {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            min_snapshots: config.min_snapshots_for_penalty,
            min_blocks: config.min_blocks_for_penalty,
        }
    }

    /// Classify `history` as seen at `current_block`.
    pub fn check(&self, history: Option<&[StakeSnapshot]>, current_block: u64) -> Protection {
        let Some(first) = history.and_then(|h| h.first()) else {
            return Protection::NoHistory;
        };
        let have = history.map_or(0, <[StakeSnapshot]>::len);
        if have < self.min_snapshots {
            return Protection::TooFewSnapshots {
                have,
                need: self.min_snapshots,
            };
        }
        match current_block.checked_sub(first.block) {
            Some(since) if since >= self.min_blocks => Protection::Eligible,
            since_first => Protection::TooRecent {
                since_first,
                need: self.min_blocks,
            },
        }
    }

    pub fn is_protected(&self, history: Option<&[StakeSnapshot]>, current_block: u64) -> bool {
        self.check(history, current_block).is_protected()
    }
}
