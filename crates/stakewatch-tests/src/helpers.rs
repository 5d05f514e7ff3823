//! Shared fixtures for the consensus and adversarial suites.

use stakewatch_core::config::EngineConfig;
use stakewatch_core::constants::SNAPSHOT_INTERVAL_BLOCKS;
use stakewatch_core::traits::MemoryBackend;
use stakewatch_core::types::{LedgerEntry, LedgerSnapshot, StakeSnapshot, Uid};
use stakewatch_detect::{Engine, ScoreVector};

/// Seconds per block on the simulated chain.
pub const BLOCK_TIME_SECS: f64 = 12.0;

/// Wall-clock origin of the simulated chain.
pub const GENESIS_TIME: f64 = 1_700_000_000.0;

/// How one uid's stake evolves over sampling intervals.
#[derive(Debug, Clone, Copy)]
pub struct StakeProfile {
    pub uid: Uid,
    pub initial: f64,
    /// Number of intervals before the decline starts.
    pub flat_intervals: u64,
    /// Stake lost per interval once declining.
    pub decline_per_interval: f64,
}

impl StakeProfile {
    pub const fn steady(uid: Uid, stake: f64) -> Self {
        Self {
            uid,
            initial: stake,
            flat_intervals: u64::MAX,
            decline_per_interval: 0.0,
        }
    }

    /// Stake at `block`. Blocks between sampling points carry extra
    /// intra-interval noise, so only aligned blocks reflect the trend.
    pub fn stake_at(&self, block: u64) -> f64 {
        let interval = block / SNAPSHOT_INTERVAL_BLOCKS;
        let declining = interval.saturating_sub(self.flat_intervals) as f64;
        let trend = (self.initial - declining * self.decline_per_interval).max(0.0);
        let offset = block % SNAPSHOT_INTERVAL_BLOCKS;
        if offset == 0 {
            trend
        } else {
            trend * (1.0 - offset as f64 / 10_000.0)
        }
    }
}

/// The "chain" every simulated validator observes.
#[derive(Debug, Clone)]
pub struct SimulatedChain {
    pub profiles: Vec<StakeProfile>,
}

impl SimulatedChain {
    pub fn new(profiles: Vec<StakeProfile>) -> Self {
        Self { profiles }
    }

    /// Three-uid chain: a heavy seller, a mild seller, and a holder.
    pub fn standard() -> Self {
        Self::new(vec![
            StakeProfile {
                uid: 100,
                initial: 10_000.0,
                flat_intervals: 2,
                decline_per_interval: 500.0,
            },
            StakeProfile {
                uid: 200,
                initial: 5_000.0,
                flat_intervals: 3,
                decline_per_interval: 60.0,
            },
            StakeProfile::steady(300, 2_500.0),
        ])
    }

    pub fn uids(&self) -> Vec<Uid> {
        self.profiles.iter().map(|p| p.uid).collect()
    }

    /// Ledger as seen at `block`, with `clock_skew` seconds added to the
    /// observation time.
    pub fn ledger_at(&self, block: u64, clock_skew: f64) -> LedgerSnapshot {
        LedgerSnapshot {
            block,
            observed_at: GENESIS_TIME + block as f64 * BLOCK_TIME_SECS + clock_skew,
            entries: self
                .profiles
                .iter()
                .map(|p| LedgerEntry {
                    uid: p.uid,
                    stake: p.stake_at(block),
                    emission: 1.0,
                    trust: 1.0,
                })
                .collect(),
        }
    }

    /// Equal unit scores for every uid.
    pub fn scores(&self) -> ScoreVector {
        self.profiles.iter().map(|p| (p.uid.to_string(), 1.0)).collect()
    }
}

/// Engine with default configuration and an in-memory backend.
pub fn memory_engine() -> Engine<MemoryBackend> {
    match Engine::open(EngineConfig::default(), MemoryBackend::new()) {
        Ok(engine) => engine,
        Err(e) => panic!("default engine config rejected: {e}"),
    }
}

/// Run `engine` at each block of `schedule`, in order.
pub fn run_schedule(engine: &mut Engine<MemoryBackend>, chain: &SimulatedChain, schedule: &[u64], clock_skew: f64) {
    let scores = chain.scores();
    for &block in schedule {
        engine.run_cycle(&chain.ledger_at(block, clock_skew), &scores);
    }
}

/// Aligned blocks `from..=to` in units of sampling intervals.
pub fn aligned(from: u64, to: u64) -> Vec<u64> {
    (from..=to).map(|i| i * SNAPSHOT_INTERVAL_BLOCKS).collect()
}

/// `(block, stake)` pairs of a history, dropping wall-clock time.
pub fn block_stakes(history: Option<&[StakeSnapshot]>) -> Vec<(u64, f64)> {
    history
        .unwrap_or_default()
        .iter()
        .map(|s| (s.block, s.stake))
        .collect()
}

/// Hand-built snapshot series from `(block, stake)` pairs.
pub fn snapshots(points: &[(u64, f64)]) -> Vec<StakeSnapshot> {
    points
        .iter()
        .map(|&(block, stake)| StakeSnapshot {
            observed_at: GENESIS_TIME + block as f64 * BLOCK_TIME_SECS,
            block,
            stake,
            emission: 1.0,
            trust: 1.0,
        })
        .collect()
}
