//! [`Migrator`]: the per-run state machine.
//!
//! ```text
//! Discovered ─┬─ Skipped
//!             └─ Pending ── Running ─┬─ Applied
//!                                    └─ Failed  (run stops here)
//! ```
//!
//! Files are processed one at a time in ascending version order. The ledger
//! is read once per run; the migrator is its only writer while running.

use std::time::Instant;

use bqm_core::{
  backend::{DeployedJob, QueryBackend, ScheduleBackend, Statement},
  ledger::LedgerRecord,
};
use chrono::Utc;

use crate::{
  Error, Result, Settings,
  deployer::Deployer,
  discover::discover,
  error::BoxError,
  ledger::Ledger,
  plan::{Disposition, PlannedMigration, Route, plan},
  report::{FileReport, FileState, RunOutcome, RunReport},
  status::StatusReport,
};

/// Applies migration scripts to one target through two backends.
pub struct Migrator<Q, D> {
  settings:  Settings,
  query:     Q,
  scheduler: D,
}

impl<Q, D> Migrator<Q, D>
where
  Q: QueryBackend,
  D: ScheduleBackend,
{
  /// Validate `settings` and bind the backends.
  pub fn new(settings: Settings, query: Q, scheduler: D) -> Result<Self> {
    settings.validate()?;
    Ok(Self { settings, query, scheduler })
  }

  fn ledger(&self) -> Ledger<'_, Q> {
    Ledger::new(&self.query, &self.settings.target, &self.settings.control_table)
  }

  // ── Status ──────────────────────────────────────────────────────────────

  /// Read-only report of applied, failed, pending and orphaned versions.
  pub async fn status(&self) -> Result<StatusReport> {
    let files = discover(&self.settings.migrations_dir, &self.settings.parse).await?;
    let ledger = self.ledger();
    ledger.ensure_schema().await?;
    let records = ledger.load_all().await?;
    Ok(StatusReport::build(&files, &records, &self.settings.target))
  }

  // ── Run ─────────────────────────────────────────────────────────────────

  /// Execute the state machine. With `dry_run`, classification is identical
  /// but no script is executed or deployed and no ledger row is written.
  pub async fn run(&self, dry_run: bool) -> RunReport {
    let ledger = self.ledger();

    let planned = match self.prepare(&ledger).await {
      Ok(planned) => planned,
      Err(e) => {
        tracing::error!(error = %e, "run aborted before start");
        return RunReport::aborted(dry_run, e);
      }
    };

    let mut files = Vec::with_capacity(planned.len());
    let mut planned = planned.into_iter();

    while let Some(migration) = planned.next() {
      let mut report = FileReport {
        version:     migration.file.version,
        script_name: migration.file.script_name.clone(),
        mode:        migration.route.mode(),
        state:       FileState::Skipped,
      };

      match (migration.disposition, dry_run) {
        (Disposition::Skip, _) => {
          tracing::info!(version = %report.version, "already applied, skipping");
        }
        (Disposition::Apply, true) => {
          tracing::info!(version = %report.version, mode = ?report.mode, "would apply");
          report.state = FileState::WouldApply;
        }
        (Disposition::Apply, false) => match self.apply(&ledger, &migration).await {
          Ok(state) => report.state = state,
          Err((state, cause)) => {
            tracing::error!(version = %report.version, error = %cause, "migration failed, stopping");
            let version = report.version;
            report.state = state;
            files.push(report);
            files.extend(planned.map(|rest| FileReport {
              version:     rest.file.version,
              script_name: rest.file.script_name,
              mode:        rest.route.mode(),
              state:       match rest.disposition {
                Disposition::Skip => FileState::Skipped,
                Disposition::Apply => FileState::NotAttempted,
              },
            }));
            return RunReport {
              dry_run,
              files,
              outcome: RunOutcome::StoppedAtFailure { version, cause },
            };
          }
        },
      }

      files.push(report);
    }

    RunReport { dry_run, files, outcome: RunOutcome::CompletedAll }
  }

  /// Everything that must succeed before the first script runs: discovery,
  /// ledger availability and checksum verification.
  async fn prepare(&self, ledger: &Ledger<'_, Q>) -> Result<Vec<PlannedMigration>> {
    let files = discover(&self.settings.migrations_dir, &self.settings.parse).await?;
    ledger.ensure_schema().await?;
    let applied = ledger.load_applied().await?;
    plan(files, &applied, &self.settings.target)
  }

  /// Run or deploy one pending migration and record the attempt.
  ///
  /// On failure returns the state to report alongside the cause that stops
  /// the run.
  async fn apply(
    &self,
    ledger: &Ledger<'_, Q>,
    migration: &PlannedMigration,
  ) -> Result<FileState, (FileState, Error)> {
    let file = &migration.file;
    let target = &self.settings.target;

    tracing::info!(version = %file.version, script = %file.script_name, "applying");
    let started_at = Utc::now();
    let clock = Instant::now();

    let result: Result<Option<DeployedJob>, BoxError> = match &migration.route {
      Route::Direct => {
        let statement = Statement::new(file.body(target), &target.location);
        self
          .query
          .execute(&statement)
          .await
          .map(|_| None)
          .map_err(|e| Box::new(e) as BoxError)
      }
      Route::Scheduled(meta) => Deployer::new(&self.scheduler, target)
        .deploy(file, meta)
        .await
        .map(Some)
        .map_err(|e| Box::new(e) as BoxError),
    };

    let duration_ms = i64::try_from(clock.elapsed().as_millis()).unwrap_or(i64::MAX);

    let record = LedgerRecord {
      version: file.version,
      script_name: file.script_name.clone(),
      checksum: migration.checksum.clone(),
      applied_at: started_at,
      duration_ms,
      success: result.is_ok(),
      error_message: result.as_ref().err().map(ToString::to_string),
    };

    let recorded = ledger.record_outcome(&record).await;

    match (result, recorded) {
      (Ok(job), Ok(())) => {
        tracing::info!(version = %file.version, duration_ms, "applied");
        Ok(FileState::Applied { duration_ms, job: job.map(|j| j.name) })
      }
      (Ok(_), Err(ledger_err)) => Err((
        FileState::Failed { error: ledger_err.to_string() },
        ledger_err,
      )),
      (Err(source), recorded) => {
        if let Err(ledger_err) = recorded {
          tracing::warn!(version = %file.version, error = %ledger_err, "failed attempt not recorded");
        }
        let error = source.to_string();
        let cause = match migration.route {
          Route::Direct => Error::Execution {
            version: file.version,
            script_name: file.script_name.clone(),
            source,
          },
          Route::Scheduled(_) => Error::Deployment {
            version: file.version,
            script_name: file.script_name.clone(),
            source,
          },
        };
        Err((FileState::Failed { error }, cause))
      }
    }
  }
}
