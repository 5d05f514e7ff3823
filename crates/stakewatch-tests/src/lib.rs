//! Cross-crate test suites for Stakewatch.
//!
//! The integration tests under `tests/` check that independent validators
//! agree on verdicts, that every per-entity failure stays isolated, and that
//! score adjustment conserves the original total.

pub mod helpers;
