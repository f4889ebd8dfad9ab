//! Result of a [`Migrator::run`](crate::Migrator::run).
//!
//! A run never returns `Err`: every terminal condition is a [`RunOutcome`]
//! variant, so callers branch on a value instead of unwinding.

use bqm_core::migration::Version;
use serde::{Serialize, Serializer, ser::SerializeStruct};

use crate::{Error, plan::Mode};

/// Terminal state of one file in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FileState {
  /// Already applied with a matching checksum.
  Skipped,
  /// Dry run only: would have been executed or deployed.
  WouldApply,
  Applied {
    duration_ms: i64,
    /// Resource name of the recurring job, for scheduled scripts.
    #[serde(skip_serializing_if = "Option::is_none")]
    job:         Option<String>,
  },
  Failed {
    error: String,
  },
  /// Pending, but the run stopped at an earlier failure.
  NotAttempted,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
  pub version:     Version,
  pub script_name: String,
  pub mode:        Mode,
  #[serde(flatten)]
  pub state:       FileState,
}

#[derive(Debug)]
pub enum RunOutcome {
  /// Every file ended `Skipped`, `Applied` or `WouldApply`.
  CompletedAll,
  /// A script or deployment failed; nothing after it was attempted.
  StoppedAtFailure { version: Version, cause: Error },
  /// Configuration, integrity or ledger failure before anything ran.
  AbortedBeforeStart(Error),
}

impl RunOutcome {
  pub fn error(&self) -> Option<&Error> {
    match self {
      RunOutcome::CompletedAll => None,
      RunOutcome::StoppedAtFailure { cause, .. } => Some(cause),
      RunOutcome::AbortedBeforeStart(cause) => Some(cause),
    }
  }
}

impl Serialize for RunOutcome {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut s = serializer.serialize_struct("RunOutcome", 4)?;
    match self {
      RunOutcome::CompletedAll => {
        s.serialize_field("status", "completed_all")?;
      }
      RunOutcome::StoppedAtFailure { version, cause } => {
        s.serialize_field("status", "stopped_at_failure")?;
        s.serialize_field("version", version)?;
        s.serialize_field("kind", &cause.kind())?;
        s.serialize_field("message", &cause.to_string())?;
      }
      RunOutcome::AbortedBeforeStart(cause) => {
        s.serialize_field("status", "aborted_before_start")?;
        s.serialize_field("version", &cause.version())?;
        s.serialize_field("kind", &cause.kind())?;
        s.serialize_field("message", &cause.to_string())?;
      }
    }
    s.end()
  }
}

#[derive(Debug, Serialize)]
pub struct RunReport {
  pub dry_run: bool,
  pub files:   Vec<FileReport>,
  pub outcome: RunOutcome,
}

impl RunReport {
  pub(crate) fn aborted(dry_run: bool, cause: Error) -> Self {
    Self { dry_run, files: Vec::new(), outcome: RunOutcome::AbortedBeforeStart(cause) }
  }

  pub fn is_success(&self) -> bool { matches!(self.outcome, RunOutcome::CompletedAll) }

  /// Files that were applied, or would be in a dry run.
  pub fn changed(&self) -> usize {
    self
      .files
      .iter()
      .filter(|f| matches!(f.state, FileState::Applied { .. } | FileState::WouldApply))
      .count()
  }

  pub fn skipped(&self) -> usize {
    self.files.iter().filter(|f| f.state == FileState::Skipped).count()
  }
}
