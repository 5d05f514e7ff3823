//! Criterion benchmarks for stakewatch-detect hot paths.
//!
//! Covers: single-uid analysis, score adjustment, and a full scoring cycle
//! over a subnet-sized ledger.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use stakewatch_core::config::EngineConfig;
use stakewatch_core::traits::MemoryBackend;
use stakewatch_core::types::{LedgerEntry, LedgerSnapshot, PenaltyLevel, StakeSnapshot};
use stakewatch_detect::{AnomalyDetector, Engine, PenaltyLedger, ScoreVector, Violation, adjust_scores};

const UIDS: u16 = 256;

fn history(rng: &mut StdRng, len: u64) -> Vec<StakeSnapshot> {
    (0..len)
        .map(|i| StakeSnapshot {
            observed_at: i as f64 * 8_640.0,
            block: i * 720,
            stake: rng.gen_range(500.0..1_500.0),
            emission: rng.gen_range(0.0..2.0),
            trust: 1.0,
        })
        .collect()
}

fn bench_analyze(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let h = history(&mut rng, 15);
    let detector = AnomalyDetector::new(&EngineConfig::default());
    let block = h[h.len() - 1].block;

    c.bench_function("analyze_15_snapshots", |b| {
        b.iter(|| detector.analyze(black_box(1), black_box(Some(&h)), black_box(block)))
    });
}

fn bench_adjust_scores(c: &mut Criterion) {
    let mut ledger = PenaltyLedger::new(&EngineConfig::default());
    let violations: Vec<Violation> = (0..UIDS)
        .step_by(4)
        .map(|uid| Violation {
            uid,
            level: PenaltyLevel::High,
            stake_change_percent: -20.0,
            stake_change: -200.0,
            initial_stake: 1_000.0,
            current_stake: 800.0,
            avg_emission: 1.0,
            moving_avg_change_percent: -10.0,
            data_points: 10,
            blocks_analyzed: 6_480,
            initial_block: 0,
            final_block: 6_480,
        })
        .collect();
    ledger.apply(&violations, 6_480, 0.0);
    let scores: ScoreVector = (0..UIDS).map(|u| (u.to_string(), 1.0 / UIDS as f64)).collect();

    c.bench_function("adjust_scores_256", |b| {
        b.iter(|| adjust_scores(black_box(&scores), black_box(&ledger), black_box(6_500)))
    });
}

fn bench_run_cycle(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(11);
    let mut engine = match Engine::open(EngineConfig::default(), MemoryBackend::new()) {
        Ok(e) => e,
        Err(e) => panic!("default config rejected: {e}"),
    };
    let scores: ScoreVector = (0..UIDS).map(|u| (u.to_string(), 1.0)).collect();
    let ledger_at = |rng: &mut StdRng, block: u64| LedgerSnapshot {
        block,
        observed_at: block as f64 * 12.0,
        entries: (0..UIDS)
            .map(|uid| LedgerEntry {
                uid,
                stake: rng.gen_range(500.0..1_500.0),
                emission: 1.0,
                trust: 1.0,
            })
            .collect(),
    };
    for i in 0..12 {
        let snap = ledger_at(&mut rng, i * 720);
        engine.run_cycle(&snap, &scores);
    }
    let mut block = 12 * 720;

    c.bench_function("run_cycle_256_uids", |b| {
        b.iter(|| {
            block += 720;
            let snap = ledger_at(&mut rng, block);
            engine.run_cycle(black_box(&snap), black_box(&scores))
        })
    });
}

criterion_group!(benches, bench_analyze, bench_adjust_scores, bench_run_cycle);
criterion_main!(benches);
