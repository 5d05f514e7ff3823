//! Error types for Stakewatch.
use thiserror::Error;

use crate::types::Uid;

/// Rejected mutations of a stake history.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {
    #[error("malformed input for uid {uid}: {field} = {value}")] MalformedInput { uid: Uid, field: &'static str, value: f64 },
    #[error("non-increasing block in history for uid {uid}: {block} after {previous}")] NonIncreasingBlock { uid: Uid, block: u64, previous: u64 },
}

/// Why the detector could not produce a verdict.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataUnavailable {
    #[error("no history for uid {0}")] UnknownUid(Uid),
    #[error("insufficient data for uid {uid}: {have} snapshots, need {need}")] InsufficientSnapshots { uid: Uid, have: usize, need: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    #[error("io: {0}")] Io(String),
    #[error("corrupt history: {0}")] Corrupt(String),
    #[error("storage: {0}")] Storage(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")] Zero { field: &'static str },
    #[error("{field} must be positive and finite, got {value}")] NotPositive { field: &'static str, value: String },
    #[error("score reduction for {level} must lie in (0, 1), got {value}")] InvalidReduction { level: String, value: String },
    #[error("penalty bracket {level} is empty or unordered: [{min}, {max})")] InvalidBracket { level: String, min: String, max: String },
    #[error("penalty brackets overlap at {0}")] OverlappingBrackets(String),
    #[error("no penalty brackets configured")] NoBrackets,
    #[error("load: {0}")] Load(String),
}

/// Per-entity problems in caller-supplied input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("missing field: {0}")] MissingField(&'static str),
    #[error("field {field} is not a number")] NotANumber { field: &'static str },
    #[error("uid key is not an integer: {0}")] InvalidUid(String),
}

#[derive(Error, Debug)]
pub enum StakewatchError {
    #[error(transparent)] History(#[from] HistoryError),
    #[error(transparent)] Data(#[from] DataUnavailable),
    #[error(transparent)] Persist(#[from] PersistError),
    #[error(transparent)] Config(#[from] ConfigError),
    #[error(transparent)] Input(#[from] InputError),
}
