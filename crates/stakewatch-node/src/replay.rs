//! Replay input: a recorded sequence of scoring cycles.
//!
//! ```json
//! [
//!   { "block": 720, "observed_at": 1700000000.0,
//!     "entries": [ { "uid": 3, "stake": 1000.0, "emission": 0.5, "trust": 0.9 } ],
//!     "scores": { "3": 0.25 } }
//! ]
//! ```
//!
//! Input is parsed from untyped JSON so that one bad entry costs only that
//! entry. A cycle without a usable `block` or `observed_at` is an error.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use stakewatch_core::error::InputError;
use stakewatch_core::types::{LedgerEntry, LedgerSnapshot, Uid, parse_uid};
use stakewatch_detect::ScoreVector;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("io: {0}")] Io(#[from] std::io::Error),
    #[error("json: {0}")] Json(#[from] serde_json::Error),
    #[error("replay input must be a JSON array of cycles")] NotAnArray,
    #[error("cycle {index}: {source}")] InvalidCycle { index: usize, source: InputError },
}

/// One parsed cycle plus the input problems that were skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayCycle {
    pub snapshot: LedgerSnapshot,
    pub scores: ScoreVector,
    pub skipped: Vec<InputError>,
}

pub fn read_cycles(path: &Path) -> Result<Vec<ReplayCycle>, ReplayError> {
    let raw = fs::read_to_string(path)?;
    let root: Value = serde_json::from_str(&raw)?;
    parse_cycles(&root)
}

pub fn parse_cycles(root: &Value) -> Result<Vec<ReplayCycle>, ReplayError> {
    let Value::Array(cycles) = root else {
        return Err(ReplayError::NotAnArray);
    };
    cycles
        .iter()
        .enumerate()
        .map(|(index, c)| parse_cycle(c).map_err(|source| ReplayError::InvalidCycle { index, source }))
        .collect()
}

fn parse_cycle(value: &Value) -> Result<ReplayCycle, InputError> {
    let obj = value.as_object().ok_or(InputError::MissingField("block"))?;
    let block = obj
        .get("block")
        .ok_or(InputError::MissingField("block"))?
        .as_u64()
        .ok_or(InputError::NotANumber { field: "block" })?;
    let observed_at = number(obj, "observed_at")?;

    let mut skipped = Vec::new();
    let mut entries = Vec::new();
    if let Some(raw) = obj.get("entries").and_then(Value::as_array) {
        for e in raw {
            match parse_entry(e) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    warn!(block, error = %err, "skipping malformed ledger entry");
                    skipped.push(err);
                }
            }
        }
    }

    let mut scores = ScoreVector::new();
    if let Some(raw) = obj.get("scores").and_then(Value::as_object) {
        for (key, v) in raw {
            match v.as_f64() {
                Some(score) => {
                    scores.insert(key.clone(), score);
                }
                None => {
                    warn!(block, key = %key, "skipping non-numeric score");
                    skipped.push(InputError::NotANumber { field: "score" });
                }
            }
        }
    }

    Ok(ReplayCycle {
        snapshot: LedgerSnapshot {
            block,
            observed_at,
            entries,
        },
        scores,
        skipped,
    })
}

/// Coerce one `{uid, stake, emission, trust}` object. The uid may be a
/// number or a numeric string.
pub fn parse_entry(value: &Value) -> Result<LedgerEntry, InputError> {
    let obj = value.as_object().ok_or(InputError::MissingField("uid"))?;
    let uid = match obj.get("uid") {
        None | Some(Value::Null) => return Err(InputError::MissingField("uid")),
        Some(Value::String(s)) => parse_uid(s)?,
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| Uid::try_from(n).ok())
            .ok_or_else(|| InputError::InvalidUid(n.to_string()))?,
        Some(other) => return Err(InputError::InvalidUid(other.to_string())),
    };
    Ok(LedgerEntry {
        uid,
        stake: number(obj, "stake")?,
        emission: number(obj, "emission")?,
        trust: number(obj, "trust")?,
    })
}

fn number(obj: &Map<String, Value>, field: &'static str) -> Result<f64, InputError> {
    obj.get(field)
        .ok_or(InputError::MissingField(field))?
        .as_f64()
        .ok_or(InputError::NotANumber { field })
}
