//! Engine persistence through the durable backends.

use std::fs;
use std::path::PathBuf;

use stakewatch_core::config::EngineConfig;
use stakewatch_core::types::{LedgerEntry, LedgerSnapshot};
use stakewatch_detect::{CycleEvent, Engine, ScoreVector};
use stakewatch_node::{BackendKind, JsonFileBackend, NodeConfig, open_backend};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn snapshot(block: u64, stakes: &[(u16, f64)]) -> LedgerSnapshot {
    LedgerSnapshot {
        block,
        observed_at: 1_700_000_000.0 + block as f64 * 12.0,
        entries: stakes
            .iter()
            .map(|&(uid, stake)| LedgerEntry {
                uid,
                stake,
                emission: 0.1,
                trust: 1.0,
            })
            .collect(),
    }
}

fn node_config(dir: PathBuf, backend: BackendKind) -> NodeConfig {
    NodeConfig {
        data_dir: dir,
        backend,
        ..NodeConfig::default()
    }
}

fn run_and_reopen(config: &NodeConfig) {
    let backend = open_backend(config).unwrap();
    let mut engine = Engine::open(config.engine.clone(), backend).unwrap();
    for i in 0..4u64 {
        let report = engine.run_cycle(&snapshot(i * 720, &[(1, 100.0), (2, 50.0)]), &ScoreVector::new());
        assert!(!report
            .events
            .iter()
            .any(|e| matches!(e, CycleEvent::PersistFailed { .. })));
    }
    engine.flush().unwrap();
    drop(engine);

    let backend = open_backend(config).unwrap();
    let reopened = Engine::open(config.engine.clone(), backend).unwrap();
    assert_eq!(reopened.store().len(), 2);
    assert_eq!(reopened.store().snapshot_count(1), 4);
    assert_eq!(reopened.history(2).unwrap()[3].block, 2_160);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn json_backend_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = node_config(dir.path().to_path_buf(), BackendKind::Json);
    run_and_reopen(&config);
    assert!(config.history_file().exists());
}

#[cfg(feature = "rocksdb")]
#[test]
fn rocksdb_backend_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = node_config(dir.path().to_path_buf(), BackendKind::Rocksdb);
    run_and_reopen(&config);
}

#[test]
fn corrupt_file_starts_fresh_and_is_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stake_history_49.json");
    fs::write(&path, "{ this is not json").unwrap();

    let mut engine = Engine::open(EngineConfig::default(), JsonFileBackend::new(&path)).unwrap();
    assert!(engine.store().is_empty());

    engine.run_cycle(&snapshot(720, &[(4, 1.0)]), &ScoreVector::new());
    let reread = fs::read_to_string(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&reread).unwrap();
    assert!(parsed["4"].is_array());
}

#[test]
fn unordered_persisted_history_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("h.json");
    fs::write(
        &path,
        r#"{
            "1": [{"observed_at": 1.0, "block": 1440, "stake": 1.0, "emission": 0.0, "trust": 1.0},
                  {"observed_at": 2.0, "block": 720, "stake": 1.0, "emission": 0.0, "trust": 1.0}],
            "2": [{"observed_at": 1.0, "block": 720, "stake": 5.0, "emission": 0.0, "trust": 1.0}]
        }"#,
    )
    .unwrap();
    let engine = Engine::open(EngineConfig::default(), JsonFileBackend::new(&path)).unwrap();
    assert!(engine.history(1).is_none());
    assert_eq!(engine.store().snapshot_count(2), 1);
    assert!(engine.is_dirty());
}
