//! Core value types shared across the Stakewatch crates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, InputError};

/// Network-assigned identifier of a tracked entity (miner).
pub type Uid = u16;

/// One recorded `(block, stake, emission, trust)` observation for a uid.
///
/// `observed_at` is the caller's wall-clock time in unix seconds. It is
/// informational for detection and only drives the age-based cleanup pass;
/// every consensus-relevant decision keys off `block`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct StakeSnapshot {
    #[serde(alias = "timestamp")]
    pub observed_at: f64,
    pub block: u64,
    pub stake: f64,
    pub emission: f64,
    pub trust: f64,
}

/// A single entity's row in a ledger snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub uid: Uid,
    pub stake: f64,
    pub emission: f64,
    pub trust: f64,
}

impl LedgerEntry {
    /// Reject non-finite or negative values.
    ///
    /// # Examples
    ///
    /// ```
    /// use stakewatch_core::types::LedgerEntry;
    ///
    /// let ok = LedgerEntry { uid: 1, stake: 10.0, emission: 0.5, trust: 1.0 };
    /// assert!(ok.validate().is_ok());
    ///
    /// let bad = LedgerEntry { stake: f64::NAN, ..ok };
    /// assert!(bad.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), HistoryError> {
        for (field, value) in [
            ("stake", self.stake),
            ("emission", self.emission),
            ("trust", self.trust),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(HistoryError::MalformedInput {
                    uid: self.uid,
                    field,
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Immutable per-cycle view of the ledger at one block height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub block: u64,
    pub observed_at: f64,
    pub entries: Vec<LedgerEntry>,
}

/// Severity tier of an over-selling violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PenaltyLevel {
    Moderate,
    High,
    Extreme,
}

impl PenaltyLevel {
    pub const ALL: [PenaltyLevel; 3] = [Self::Moderate, Self::High, Self::Extreme];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Extreme => "extreme",
        }
    }
}

impl fmt::Display for PenaltyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a uid from the string key used by score vectors and JSON input.
///
/// ```
/// use stakewatch_core::types::parse_uid;
///
/// assert_eq!(parse_uid(" 42").unwrap(), 42);
/// assert!(parse_uid("hotkey-a").is_err());
/// ```
pub fn parse_uid(key: &str) -> Result<Uid, InputError> {
    key.trim()
        .parse::<Uid>()
        .map_err(|_| InputError::InvalidUid(key.to_string()))
}

/// Current wall-clock time as fractional unix seconds.
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
