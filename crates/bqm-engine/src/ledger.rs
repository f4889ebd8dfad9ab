//! [`Ledger`]: the control table that records every migration attempt.
//!
//! All access goes through the injected [`QueryBackend`]. Statements are
//! BigQuery standard SQL with named parameters; the same text is accepted by
//! the SQLite emulator.

use std::collections::BTreeMap;

use bqm_core::{
  backend::{ParamValue, QueryBackend, QueryResult, Statement},
  ledger::LedgerRecord,
  migration::Version,
  target::Target,
};

use crate::{Error, Result, encode::decode_record};

const COLUMNS: &str =
  "version, script_name, checksum, applied_at, duration_ms, success, error_message";

/// The control table of one target, bound to a backend for one run.
pub struct Ledger<'a, Q> {
  backend:  &'a Q,
  location: &'a str,
  /// Backtick-quoted `project.dataset.table`.
  table:    String,
}

impl<'a, Q: QueryBackend> Ledger<'a, Q> {
  pub fn new(backend: &'a Q, target: &'a Target, control_table: &str) -> Self {
    Self {
      backend,
      location: &target.location,
      table: target.qualify(control_table),
    }
  }

  /// Create the control table if it does not exist. Safe to call every run.
  pub async fn ensure_schema(&self) -> Result<()> {
    let sql = format!(
      "CREATE TABLE IF NOT EXISTS {} (
  version       STRING    NOT NULL,
  script_name   STRING    NOT NULL,
  checksum      STRING    NOT NULL,
  applied_at    TIMESTAMP NOT NULL,
  duration_ms   INT64     NOT NULL,
  success       BOOL      NOT NULL,
  error_message STRING
)",
      self.table
    );
    self.query("schema check", Statement::new(sql, self.location)).await?;
    Ok(())
  }

  /// Versions whose latest record is a success.
  pub async fn load_applied(&self) -> Result<BTreeMap<Version, LedgerRecord>> {
    let sql = format!("SELECT {COLUMNS} FROM {} WHERE success = TRUE", self.table);
    self.load(sql).await
  }

  /// Every version with a record, successful or not.
  pub async fn load_all(&self) -> Result<BTreeMap<Version, LedgerRecord>> {
    let sql = format!("SELECT {COLUMNS} FROM {} ORDER BY version", self.table);
    self.load(sql).await
  }

  /// Replace whatever is recorded for `record.version` with `record`.
  ///
  /// Delete-then-insert keeps the table at one row per version.
  pub async fn record_outcome(&self, record: &LedgerRecord) -> Result<()> {
    let version = record.version.to_string();

    let delete = Statement::new(
      format!("DELETE FROM {} WHERE version = @version", self.table),
      self.location,
    )
    .bind("version", ParamValue::String(Some(version.clone())));
    self.query("delete", delete).await?;

    let insert = Statement::new(
      format!(
        "INSERT INTO {} ({COLUMNS}) VALUES \
         (@version, @script_name, @checksum, @applied_at, @duration_ms, @success, @error_message)",
        self.table
      ),
      self.location,
    )
    .bind("version", ParamValue::String(Some(version)))
    .bind("script_name", ParamValue::String(Some(record.script_name.clone())))
    .bind("checksum", ParamValue::String(Some(record.checksum.to_string())))
    .bind("applied_at", ParamValue::Timestamp(record.applied_at))
    .bind("duration_ms", ParamValue::Int64(record.duration_ms))
    .bind("success", ParamValue::Bool(record.success))
    .bind("error_message", ParamValue::String(record.error_message.clone()));
    self.query("insert", insert).await?;

    tracing::debug!(version = %record.version, success = record.success, "ledger updated");
    Ok(())
  }

  async fn load(&self, sql: String) -> Result<BTreeMap<Version, LedgerRecord>> {
    let result = self.query("read", Statement::new(sql, self.location)).await?;

    let mut records: BTreeMap<Version, LedgerRecord> = BTreeMap::new();
    for row in &result.rows {
      let record = decode_record(row)?;
      match records.get(&record.version) {
        Some(existing) if !supersedes(&record, existing) => {}
        _ => {
          records.insert(record.version, record);
        }
      }
    }
    Ok(records)
  }

  async fn query(&self, operation: &'static str, statement: Statement) -> Result<QueryResult> {
    tracing::trace!(sql = %statement.sql, "ledger statement");
    self
      .backend
      .execute(&statement)
      .await
      .map_err(|e| Error::Ledger { operation, source: Box::new(e) })
  }
}

/// Tables written by older tooling may hold several rows per version. A
/// success beats a failure; otherwise the later attempt wins.
fn supersedes(candidate: &LedgerRecord, existing: &LedgerRecord) -> bool {
  (candidate.success, candidate.applied_at) > (existing.success, existing.applied_at)
}
