//! Backend traits and their request/response types.
//!
//! Two external services are involved in a run: a query executor (used both
//! for migration scripts and for the ledger's control table) and a
//! recurring-job deployer. Concrete implementations live in
//! `bqm-store-sqlite` and `bqm-bigquery`; the engine depends only on these
//! traits.

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;

// ─── Statements ──────────────────────────────────────────────────────────────

/// A typed, nullable query parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
  String(Option<String>),
  Int64(i64),
  Bool(bool),
  Timestamp(DateTime<Utc>),
}

/// A named parameter, referenced in SQL as `@name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
  pub name:  String,
  pub value: ParamValue,
}

/// SQL text submitted to a [`QueryBackend`], with its target location.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
  pub sql:      String,
  pub location: String,
  pub params:   Vec<Param>,
}

impl Statement {
  pub fn new(sql: impl Into<String>, location: impl Into<String>) -> Self {
    Self { sql: sql.into(), location: location.into(), params: Vec::new() }
  }

  /// Attach a named parameter.
  pub fn bind(mut self, name: &str, value: ParamValue) -> Self {
    self.params.push(Param { name: name.to_owned(), value });
    self
  }
}

// ─── Results ─────────────────────────────────────────────────────────────────

/// One result row: ordered `(column, value)` pairs. Values are rendered as
/// text regardless of column type; `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
  columns: Vec<(String, Option<String>)>,
}

impl Row {
  pub fn new(columns: Vec<(String, Option<String>)>) -> Self { Self { columns } }

  /// Value of `column`. `None` if the column is absent or NULL.
  pub fn get(&self, column: &str) -> Option<&str> {
    self
      .columns
      .iter()
      .find(|(name, _)| name.eq_ignore_ascii_case(column))
      .and_then(|(_, value)| value.as_deref())
  }
}

/// Outcome of a successful [`QueryBackend::execute`] call.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
  /// Rows of the last row-returning statement; empty for DDL/DML.
  pub rows:    Vec<Row>,
  pub elapsed: Duration,
}

// ─── Scheduled jobs ──────────────────────────────────────────────────────────

/// Payload for [`ScheduleBackend::upsert`]. The display name is the
/// idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledJobDefinition {
  pub display_name:        String,
  pub schedule_expression: String,
  pub description:         String,
  /// Substituted SQL body, directive header removed.
  pub query:               String,
  pub project:             String,
  pub destination_dataset: String,
  pub location:            String,
}

/// What the deployment backend did with a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployedJob {
  /// Backend resource name of the recurring job.
  pub name:    String,
  /// `true` if a new job was created, `false` if an existing one was updated.
  pub created: bool,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Executes SQL against the warehouse and waits for a definitive outcome.
pub trait QueryBackend: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Submit `statement` and block until it succeeds or fails. Multi-statement
  /// scripts are accepted.
  fn execute<'a>(
    &'a self,
    statement: &'a Statement,
  ) -> impl Future<Output = Result<QueryResult, Self::Error>> + Send + 'a;
}

/// Creates or updates recurring jobs, keyed by display name.
pub trait ScheduleBackend: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Create the job if no job with `def.display_name` exists, otherwise
  /// update that job's query and schedule in place.
  fn upsert<'a>(
    &'a self,
    def: &'a ScheduledJobDefinition,
  ) -> impl Future<Output = Result<DeployedJob, Self::Error>> + Send + 'a;
}
