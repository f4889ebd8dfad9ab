//! Per-file classification shared by real runs and dry runs.
//!
//! Planning happens entirely before the first side effect: every applied
//! file's checksum is verified up front, so drift anywhere in the sequence
//! stops the run before any pending script executes.

use std::collections::BTreeMap;

use bqm_core::{
  checksum::ChecksumDigest,
  ledger::LedgerRecord,
  migration::{MigrationFile, ScheduledMetadata, Version},
  target::Target,
};
use serde::Serialize;

use crate::{Error, Result};

/// Which backend a pending file is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
  Direct,
  Scheduled,
}

#[derive(Debug, Clone)]
pub enum Route {
  Direct,
  Scheduled(ScheduledMetadata),
}

impl Route {
  pub fn mode(&self) -> Mode {
    match self {
      Route::Direct => Mode::Direct,
      Route::Scheduled(_) => Mode::Scheduled,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
  /// Recorded as applied with a matching checksum.
  Skip,
  /// No successful record yet.
  Apply,
}

#[derive(Debug, Clone)]
pub struct PlannedMigration {
  pub file:        MigrationFile,
  pub route:       Route,
  pub checksum:    ChecksumDigest,
  pub disposition: Disposition,
}

/// Classify `files` (already ordered) against the successful ledger records.
///
/// Fails with [`Error::ChecksumMismatch`] on the first applied file whose
/// substituted content no longer matches its recorded checksum. Failed
/// records are not passed in and so are treated as absent.
pub fn plan(
  files: Vec<MigrationFile>,
  applied: &BTreeMap<Version, LedgerRecord>,
  target: &Target,
) -> Result<Vec<PlannedMigration>> {
  files
    .into_iter()
    .map(|file| {
      let checksum = file.checksum(target);

      let disposition = match applied.get(&file.version) {
        Some(record) if record.checksum == checksum => Disposition::Skip,
        Some(record) => {
          return Err(Error::ChecksumMismatch {
            version:     file.version,
            script_name: file.script_name.clone(),
            recorded:    record.checksum.clone(),
            current:     checksum,
          });
        }
        None => Disposition::Apply,
      };

      let route = match file.scheduled_metadata(target) {
        Some(meta) => Route::Scheduled(meta),
        None => Route::Direct,
      };

      Ok(PlannedMigration { file, route, checksum, disposition })
    })
    .collect()
}
