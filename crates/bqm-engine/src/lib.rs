//! Migration execution engine.
//!
//! Ties the pure pieces from [`bqm_core`] to a [`QueryBackend`] and a
//! [`ScheduleBackend`]: discovers scripts, consults the [`Ledger`], plans
//! skip/apply per file, executes or deploys strictly in version order, and
//! records every attempt.
//!
//! [`QueryBackend`]: bqm_core::backend::QueryBackend
//! [`ScheduleBackend`]: bqm_core::backend::ScheduleBackend

mod encode;

pub mod config;
pub mod deployer;
pub mod discover;
pub mod error;
pub mod ledger;
pub mod migrator;
pub mod plan;
pub mod report;
pub mod status;

pub use config::Settings;
pub use error::{Error, ErrorKind, Result};
pub use ledger::Ledger;
pub use migrator::Migrator;
pub use report::{FileReport, FileState, RunOutcome, RunReport};
pub use status::{StatusEntry, StatusReport};

#[cfg(test)]
mod tests;
