//! [`SqliteWarehouse`]: both engine backends over one SQLite file.
//!
//! Project-qualified table paths such as `` `acme.analytics.orders` `` are
//! ordinary quoted identifiers to SQLite, so migration scripts written for
//! the warehouse run unchanged as long as they stick to portable SQL.
//! `STRING` is read as `TEXT` so text columns keep TEXT affinity.

use std::{future::Future, path::Path, time::Instant};

use bqm_core::backend::{
  DeployedJob, QueryBackend, QueryResult, Row, ScheduleBackend, ScheduledJobDefinition,
  Statement,
};
use chrono::{DateTime, Utc};
use rusqlite::{Batch, OptionalExtension as _};
use uuid::Uuid;

use crate::{
  Error, Result, dialect,
  encode::{decode_dt, decode_value, encode_dt, encode_param},
  schedule,
  schema::{SCHEDULED_JOBS, SCHEMA},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Local stand-in for the warehouse and the scheduled-query service.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteWarehouse {
  conn: tokio_rusqlite::Connection,
}

/// A recurring job as recorded by [`SqliteWarehouse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredJob {
  pub display_name:        String,
  pub job_name:            String,
  pub schedule:            String,
  pub description:         String,
  pub query:               String,
  pub destination_dataset: String,
  pub location:            String,
  pub created_at:          DateTime<Utc>,
  pub updated_at:          DateTime<Utc>,
}

impl SqliteWarehouse {
  /// Open (or create) a database at `path` and initialise bookkeeping tables.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory database, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Every deployed job, ordered by display name.
  pub async fn scheduled_jobs(&self) -> Result<Vec<StoredJob>> {
    type RawJob = (String, String, String, String, String, String, String, String, String);

    let raw: Vec<RawJob> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT display_name, job_name, schedule, description, query, \
           destination_dataset, location, created_at, updated_at \
           FROM {SCHEDULED_JOBS} ORDER BY display_name"
        ))?;
        let rows = stmt
          .query_map([], |r| {
            Ok((
              r.get(0)?,
              r.get(1)?,
              r.get(2)?,
              r.get(3)?,
              r.get(4)?,
              r.get(5)?,
              r.get(6)?,
              r.get(7)?,
              r.get(8)?,
            ))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raw
      .into_iter()
      .map(
        |(
          display_name,
          job_name,
          schedule,
          description,
          query,
          destination_dataset,
          location,
          created_at,
          updated_at,
        )| {
          Ok(StoredJob {
            display_name,
            job_name,
            schedule,
            description,
            query,
            destination_dataset,
            location,
            created_at: decode_dt(&created_at)?,
            updated_at: decode_dt(&updated_at)?,
          })
        },
      )
      .collect()
  }

  async fn run_script(&self, statement: &Statement) -> Result<QueryResult> {
    let sql = dialect::translate(&statement.sql);
    let params: Vec<(String, rusqlite::types::Value)> = statement
      .params
      .iter()
      .map(|p| (format!("@{}", p.name), encode_param(&p.value)))
      .collect();

    let started = Instant::now();
    let rows = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut rows = Vec::new();
        {
          let mut batch = Batch::new(&tx, &sql);
          while let Some(mut stmt) = batch.next()? {
            for (name, value) in &params {
              if let Some(index) = stmt.parameter_index(name)? {
                stmt.raw_bind_parameter(index, value)?;
              }
            }

            if stmt.column_count() == 0 {
              stmt.raw_execute()?;
              continue;
            }

            // A script's result is that of its last row-returning statement.
            let names: Vec<String> =
              stmt.column_names().into_iter().map(str::to_owned).collect();
            rows.clear();
            let mut cursor = stmt.raw_query();
            while let Some(row) = cursor.next()? {
              let mut columns = Vec::with_capacity(names.len());
              for (i, name) in names.iter().enumerate() {
                columns.push((name.clone(), decode_value(row.get_ref(i)?)));
              }
              rows.push(Row::new(columns));
            }
          }
        }
        tx.commit()?;
        Ok(rows)
      })
      .await?;

    Ok(QueryResult { rows, elapsed: started.elapsed() })
  }

  async fn upsert_job(&self, def: &ScheduledJobDefinition) -> Result<DeployedJob> {
    schedule::validate(&def.schedule_expression)?;

    let def = def.clone();
    let now = encode_dt(Utc::now());
    let fresh_name = format!(
      "projects/{}/locations/{}/transferConfigs/{}",
      def.project,
      def.location.to_ascii_lowercase(),
      Uuid::new_v4().simple()
    );

    let job = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let existing: Option<String> = tx
          .query_row(
            &format!("SELECT job_name FROM {SCHEDULED_JOBS} WHERE display_name = ?1"),
            rusqlite::params![def.display_name],
            |r| r.get(0),
          )
          .optional()?;

        let job = match existing {
          Some(name) => {
            tx.execute(
              &format!(
                "UPDATE {SCHEDULED_JOBS} SET schedule = ?2, description = ?3, query = ?4, \
                 destination_dataset = ?5, location = ?6, updated_at = ?7 \
                 WHERE display_name = ?1"
              ),
              rusqlite::params![
                def.display_name,
                def.schedule_expression,
                def.description,
                def.query,
                def.destination_dataset,
                def.location,
                now,
              ],
            )?;
            DeployedJob { name, created: false }
          }
          None => {
            tx.execute(
              &format!(
                "INSERT INTO {SCHEDULED_JOBS} (display_name, job_name, schedule, description, \
                 query, destination_dataset, location, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)"
              ),
              rusqlite::params![
                def.display_name,
                fresh_name,
                def.schedule_expression,
                def.description,
                def.query,
                def.destination_dataset,
                def.location,
                now,
              ],
            )?;
            DeployedJob { name: fresh_name, created: true }
          }
        };
        tx.commit()?;
        Ok(job)
      })
      .await?;

    Ok(job)
  }
}

// ─── Backend impls ───────────────────────────────────────────────────────────

impl QueryBackend for SqliteWarehouse {
  type Error = Error;

  /// Runs the whole script in one transaction: a failing statement rolls back
  /// the statements before it.
  fn execute<'a>(
    &'a self,
    statement: &'a Statement,
  ) -> impl Future<Output = Result<QueryResult>> + Send + 'a {
    async move {
      tracing::debug!(params = statement.params.len(), "sqlite execute");
      self.run_script(statement).await
    }
  }
}

impl ScheduleBackend for SqliteWarehouse {
  type Error = Error;

  fn upsert<'a>(
    &'a self,
    def: &'a ScheduledJobDefinition,
  ) -> impl Future<Output = Result<DeployedJob>> + Send + 'a {
    self.upsert_job(def)
  }
}
