//! # stakewatch-core
//! Foundation types, configuration, and the stake history store for
//! Stakewatch.

pub mod config;
pub mod constants;
pub mod error;
pub mod history;
pub mod schedule;
pub mod traits;
pub mod types;
