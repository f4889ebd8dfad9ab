//! Ledger records: one row per attempted migration version.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{checksum::ChecksumDigest, migration::Version};

pub const DEFAULT_CONTROL_TABLE: &str = "schema_migrations";

/// A row of the control table.
///
/// At most one record exists per version. A failed record (`success ==
/// false`) is kept for auditing and replaced once the version succeeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerRecord {
  pub version:       Version,
  pub script_name:   String,
  pub checksum:      ChecksumDigest,
  /// Execution start time.
  pub applied_at:    DateTime<Utc>,
  pub duration_ms:   i64,
  pub success:       bool,
  /// Populated only when `success == false`.
  pub error_message: Option<String>,
}
