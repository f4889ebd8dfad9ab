//! Read-only view of discovered files against the ledger.

use std::collections::{BTreeMap, BTreeSet};

use bqm_core::{
  ledger::LedgerRecord,
  migration::{MigrationFile, Version},
  target::Target,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::plan::Mode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EntryState {
  Applied {
    applied_at:  DateTime<Utc>,
    duration_ms: i64,
    /// The file no longer matches the recorded checksum.
    drifted:     bool,
  },
  Failed {
    applied_at: DateTime<Utc>,
    error:      Option<String>,
  },
  Pending,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
  pub version:     Version,
  pub script_name: String,
  pub mode:        Mode,
  #[serde(flatten)]
  pub state:       EntryState,
}

/// A ledger row with no matching file on disk.
#[derive(Debug, Clone, Serialize)]
pub struct Orphan {
  pub version:     Version,
  pub script_name: String,
  pub applied_at:  DateTime<Utc>,
  pub success:     bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
  pub entries: Vec<StatusEntry>,
  pub orphans: Vec<Orphan>,
}

impl StatusReport {
  pub fn build(
    files: &[MigrationFile],
    records: &BTreeMap<Version, LedgerRecord>,
    target: &Target,
  ) -> Self {
    let entries = files
      .iter()
      .map(|file| {
        let state = match records.get(&file.version) {
          Some(r) if r.success => EntryState::Applied {
            applied_at:  r.applied_at,
            duration_ms: r.duration_ms,
            drifted:     r.checksum != file.checksum(target),
          },
          Some(r) => EntryState::Failed {
            applied_at: r.applied_at,
            error:      r.error_message.clone(),
          },
          None => EntryState::Pending,
        };
        StatusEntry {
          version: file.version,
          script_name: file.script_name.clone(),
          mode: if file.is_scheduled() { Mode::Scheduled } else { Mode::Direct },
          state,
        }
      })
      .collect();

    let on_disk: BTreeSet<Version> = files.iter().map(|f| f.version).collect();
    let orphans = records
      .values()
      .filter(|r| !on_disk.contains(&r.version))
      .map(|r| Orphan {
        version:     r.version,
        script_name: r.script_name.clone(),
        applied_at:  r.applied_at,
        success:     r.success,
      })
      .collect();

    Self { entries, orphans }
  }

  /// Files not yet successfully applied (pending or previously failed).
  pub fn pending(&self) -> usize {
    self
      .entries
      .iter()
      .filter(|e| !matches!(e.state, EntryState::Applied { .. }))
      .count()
  }

  pub fn drifted(&self) -> usize {
    self
      .entries
      .iter()
      .filter(|e| matches!(e.state, EntryState::Applied { drifted: true, .. }))
      .count()
  }
}
