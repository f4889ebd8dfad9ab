//! Run-level tests for `Migrator` against in-memory recording backends.

use std::{
  collections::BTreeMap,
  fs,
  future::Future,
  path::Path,
  sync::{Arc, Mutex},
};

use bqm_core::{
  backend::{
    DeployedJob, ParamValue, QueryBackend, QueryResult, Row, ScheduleBackend,
    ScheduledJobDefinition, Statement,
  },
  ledger::LedgerRecord,
  target::Target,
};
use tempfile::TempDir;

use crate::{
  Error, ErrorKind, FileState, Migrator, RunOutcome, Settings, encode::decode_record,
  plan::Mode, status::EntryState,
};

// ─── Mock backends ───────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct MockError(String);

#[derive(Default)]
struct WarehouseState {
  ledger:        Vec<Vec<(String, Option<String>)>>,
  /// Migration scripts submitted, in order.
  scripts:       Vec<String>,
  ledger_writes: usize,
  calls:         usize,
  unreachable:   bool,
}

/// Interprets the ledger's own statements and records everything else as a
/// migration script. Scripts containing `FAIL` are rejected.
#[derive(Clone, Default)]
struct MockWarehouse {
  state: Arc<Mutex<WarehouseState>>,
}

fn param_text(value: &ParamValue) -> Option<String> {
  match value {
    ParamValue::String(s) => s.clone(),
    ParamValue::Int64(i) => Some(i.to_string()),
    ParamValue::Bool(b) => Some(b.to_string()),
    ParamValue::Timestamp(ts) => Some(ts.to_rfc3339()),
  }
}

fn param<'s>(stmt: &'s Statement, name: &str) -> Option<&'s ParamValue> {
  stmt.params.iter().find(|p| p.name == name).map(|p| &p.value)
}

impl MockWarehouse {
  fn scripts(&self) -> Vec<String> { self.state.lock().unwrap().scripts.clone() }

  fn ledger_writes(&self) -> usize { self.state.lock().unwrap().ledger_writes }

  fn calls(&self) -> usize { self.state.lock().unwrap().calls }

  fn set_unreachable(&self) { self.state.lock().unwrap().unreachable = true; }

  fn records(&self) -> Vec<LedgerRecord> {
    self
      .state
      .lock()
      .unwrap()
      .ledger
      .iter()
      .map(|cols| decode_record(&Row::new(cols.clone())).unwrap())
      .collect()
  }

  fn handle(&self, stmt: &Statement) -> Result<QueryResult, MockError> {
    let mut state = self.state.lock().unwrap();
    state.calls += 1;
    if state.unreachable {
      return Err(MockError("connection refused".into()));
    }

    let sql = stmt.sql.trim_start();
    let is_ledger = sql.contains("schema_migrations`");

    if is_ledger && sql.starts_with("CREATE TABLE") {
      return Ok(QueryResult::default());
    }

    if is_ledger && sql.starts_with("SELECT") {
      let only_success = sql.contains("WHERE success = TRUE");
      let rows = state
        .ledger
        .iter()
        .map(|cols| Row::new(cols.clone()))
        .filter(|row| !only_success || row.get("success") == Some("true"))
        .collect();
      return Ok(QueryResult { rows, ..Default::default() });
    }

    if is_ledger && sql.starts_with("DELETE") {
      let version = param(stmt, "version").and_then(param_text);
      state
        .ledger
        .retain(|cols| Row::new(cols.clone()).get("version") != version.as_deref());
      state.ledger_writes += 1;
      return Ok(QueryResult::default());
    }

    if is_ledger && sql.starts_with("INSERT") {
      let cols = stmt
        .params
        .iter()
        .map(|p| (p.name.clone(), param_text(&p.value)))
        .collect();
      state.ledger.push(cols);
      state.ledger_writes += 1;
      return Ok(QueryResult::default());
    }

    state.scripts.push(stmt.sql.clone());
    if stmt.sql.contains("FAIL") {
      return Err(MockError(format!("Syntax error at [1:1] in {:?}", stmt.sql)));
    }
    Ok(QueryResult::default())
  }
}

impl QueryBackend for MockWarehouse {
  type Error = MockError;

  fn execute<'a>(
    &'a self,
    statement: &'a Statement,
  ) -> impl Future<Output = Result<QueryResult, MockError>> + Send + 'a {
    async move { self.handle(statement) }
  }
}

#[derive(Default)]
struct SchedulerState {
  jobs:  BTreeMap<String, ScheduledJobDefinition>,
  calls: usize,
}

/// Upserts by display name. A schedule of `whenever` is rejected.
#[derive(Clone, Default)]
struct MockScheduler {
  state: Arc<Mutex<SchedulerState>>,
}

impl MockScheduler {
  fn calls(&self) -> usize { self.state.lock().unwrap().calls }

  fn jobs(&self) -> BTreeMap<String, ScheduledJobDefinition> {
    self.state.lock().unwrap().jobs.clone()
  }
}

impl ScheduleBackend for MockScheduler {
  type Error = MockError;

  fn upsert<'a>(
    &'a self,
    def: &'a ScheduledJobDefinition,
  ) -> impl Future<Output = Result<DeployedJob, MockError>> + Send + 'a {
    async move { self.handle(def) }
  }
}

impl MockScheduler {
  fn handle(&self, def: &ScheduledJobDefinition) -> Result<DeployedJob, MockError> {
    let mut state = self.state.lock().unwrap();
    state.calls += 1;
    if def.schedule_expression == "whenever" {
      return Err(MockError(format!("Invalid schedule: {}", def.schedule_expression)));
    }
    let created = state
      .jobs
      .insert(def.display_name.clone(), def.clone())
      .is_none();
    Ok(DeployedJob { name: format!("transferConfigs/{}", def.display_name), created })
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

struct Fixture {
  dir:       TempDir,
  warehouse: MockWarehouse,
  scheduler: MockScheduler,
}

impl Fixture {
  fn new() -> Self {
    Self {
      dir:       tempfile::tempdir().unwrap(),
      warehouse: MockWarehouse::default(),
      scheduler: MockScheduler::default(),
    }
  }

  fn write(&self, name: &str, content: &str) -> &Self {
    fs::write(self.dir.path().join(name), content).unwrap();
    self
  }

  fn migrator(&self) -> Migrator<MockWarehouse, MockScheduler> {
    let target = Target::new("acme-prod", "analytics", "US").unwrap();
    let settings = Settings::new(target).with_migrations_dir(self.dir.path());
    Migrator::new(settings, self.warehouse.clone(), self.scheduler.clone()).unwrap()
  }

  fn path(&self) -> &Path { self.dir.path() }
}

const CREATE_TABLE: &str =
  "CREATE TABLE `${PROJECT}.${DATASET}.orders` (id STRING, created_at TIMESTAMP);\n";
const CREATE_VIEW: &str =
  "CREATE VIEW `${PROJECT}.${DATASET}.recent_orders` AS\nSELECT * FROM `${PROJECT}.${DATASET}.orders`;\n";
const CLEANUP: &str = "-- @scheduled\n\
                       -- @display_name: orders_cleanup\n\
                       -- @schedule: every day 04:00\n\
                       DELETE FROM `${PROJECT}.${DATASET}.orders` WHERE created_at < '2020-01-01';\n";

fn states(report: &crate::RunReport) -> Vec<FileState> {
  report.files.iter().map(|f| f.state.clone()).collect()
}

// ─── End-to-end sequence ─────────────────────────────────────────────────────

#[tokio::test]
async fn apply_then_skip_then_detect_drift() {
  let fx = Fixture::new();
  fx.write("V00001_create_table.sql", CREATE_TABLE)
    .write("V00002_create_view.sql", CREATE_VIEW)
    .write("V00003_cleanup.sql", CLEANUP);

  // First run: everything applies.
  let report = fx.migrator().run(false).await;
  assert!(report.is_success(), "{:?}", report.outcome);
  assert_eq!(report.changed(), 3);
  assert!(
    report
      .files
      .iter()
      .all(|f| matches!(f.state, FileState::Applied { .. }))
  );

  let records = fx.warehouse.records();
  assert_eq!(records.len(), 3);
  assert!(records.iter().all(|r| r.success));

  // Direct scripts went to the warehouse, the scheduled one to the scheduler.
  let scripts = fx.warehouse.scripts();
  assert_eq!(scripts.len(), 2);
  assert!(scripts[0].contains("`acme-prod.analytics.orders`"));
  assert!(scripts[1].starts_with("CREATE VIEW"));
  assert_eq!(fx.scheduler.calls(), 1);
  let job = &fx.scheduler.jobs()["orders_cleanup"];
  assert_eq!(job.schedule_expression, "every day 04:00");
  assert!(job.query.starts_with("DELETE FROM `acme-prod.analytics.orders`"));
  assert!(!job.query.contains("@scheduled"));

  // Second run: nothing changes, nothing is submitted.
  let writes_before = fx.warehouse.ledger_writes();
  let report = fx.migrator().run(false).await;
  assert!(report.is_success());
  assert_eq!(states(&report), vec![FileState::Skipped; 3]);
  assert_eq!(fx.warehouse.scripts().len(), 2);
  assert_eq!(fx.scheduler.calls(), 1);
  assert_eq!(fx.warehouse.ledger_writes(), writes_before);

  // Edit an applied script: integrity error, nothing runs.
  fx.write(
    "V00002_create_view.sql",
    "CREATE OR REPLACE VIEW `${PROJECT}.${DATASET}.recent_orders` AS SELECT 1 AS x;\n",
  );
  let report = fx.migrator().run(false).await;
  match &report.outcome {
    RunOutcome::AbortedBeforeStart(err @ Error::ChecksumMismatch { version, .. }) => {
      assert_eq!(version.number(), 2);
      assert_eq!(err.kind(), ErrorKind::Integrity);
    }
    other => panic!("expected checksum mismatch, got {other:?}"),
  }
  assert_eq!(fx.warehouse.scripts().len(), 2);
  assert_eq!(fx.scheduler.calls(), 1);
  assert_eq!(fx.warehouse.ledger_writes(), writes_before);
}

#[tokio::test]
async fn drift_is_caught_before_later_pending_scripts_run() {
  let fx = Fixture::new();
  fx.write("V00001_a.sql", "SELECT 1;");
  assert!(fx.migrator().run(false).await.is_success());

  fx.write("V00001_a.sql", "SELECT 1 + 0;")
    .write("V00002_b.sql", "SELECT 2;");
  let report = fx.migrator().run(false).await;

  assert!(matches!(
    report.outcome,
    RunOutcome::AbortedBeforeStart(Error::ChecksumMismatch { .. })
  ));
  assert_eq!(fx.warehouse.scripts(), vec!["SELECT 1;".to_string()]);
}

// ─── Failures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn execution_failure_stops_the_run() {
  let fx = Fixture::new();
  fx.write("V00001_ok.sql", "SELECT 1;")
    .write("V00002_broken.sql", "SELEC FAIL;")
    .write("V00003_later.sql", "SELECT 3;")
    .write("V00004_job.sql", CLEANUP);

  let report = fx.migrator().run(false).await;

  match &report.outcome {
    RunOutcome::StoppedAtFailure { version, cause } => {
      assert_eq!(version.number(), 2);
      assert_eq!(cause.kind(), ErrorKind::Execution);
      assert!(cause.to_string().contains("V00002_broken.sql"));
      assert!(cause.to_string().contains("Syntax error"));
    }
    other => panic!("expected failure at V00002, got {other:?}"),
  }

  assert_eq!(fx.warehouse.scripts(), vec!["SELECT 1;", "SELEC FAIL;"]);
  assert_eq!(fx.scheduler.calls(), 0);

  let s = states(&report);
  assert!(matches!(s[0], FileState::Applied { .. }));
  assert!(matches!(&s[1], FileState::Failed { error } if error.contains("Syntax error")));
  assert_eq!(s[2], FileState::NotAttempted);
  assert_eq!(s[3], FileState::NotAttempted);

  let records = fx.warehouse.records();
  assert_eq!(records.len(), 2);
  let failed = records.iter().find(|r| r.version.number() == 2).unwrap();
  assert!(!failed.success);
  assert!(failed.error_message.as_deref().unwrap().contains("Syntax error"));
}

#[tokio::test]
async fn failed_version_is_retried_and_its_row_replaced() {
  let fx = Fixture::new();
  fx.write("V00001_ok.sql", "SELECT 1;")
    .write("V00002_fixme.sql", "SELECT FAIL;");
  assert!(!fx.migrator().run(false).await.is_success());

  fx.write("V00002_fixme.sql", "SELECT 2;")
    .write("V00003_next.sql", "SELECT 3;");
  let report = fx.migrator().run(false).await;
  assert!(report.is_success(), "{:?}", report.outcome);

  let s = states(&report);
  assert_eq!(s[0], FileState::Skipped);
  assert!(matches!(s[1], FileState::Applied { .. }));
  assert!(matches!(s[2], FileState::Applied { .. }));

  let records = fx.warehouse.records();
  let v2: Vec<_> = records.iter().filter(|r| r.version.number() == 2).collect();
  assert_eq!(v2.len(), 1);
  assert!(v2[0].success);
  assert_eq!(v2[0].error_message, None);
}

#[tokio::test]
async fn deployment_failure_stops_the_run() {
  let fx = Fixture::new();
  fx.write("V00001_job.sql", "-- @scheduled\n-- @schedule: whenever\nSELECT 1;")
    .write("V00002_after.sql", "SELECT 2;");

  let report = fx.migrator().run(false).await;

  match &report.outcome {
    RunOutcome::StoppedAtFailure { version, cause } => {
      assert_eq!(version.number(), 1);
      assert_eq!(cause.kind(), ErrorKind::Deployment);
      assert!(cause.to_string().contains("Invalid schedule"));
    }
    other => panic!("expected deployment failure, got {other:?}"),
  }
  assert!(fx.warehouse.scripts().is_empty());
  assert_eq!(states(&report)[1], FileState::NotAttempted);

  let records = fx.warehouse.records();
  assert_eq!(records.len(), 1);
  assert!(!records[0].success);
}

#[tokio::test]
async fn unreachable_ledger_aborts_before_any_script() {
  let fx = Fixture::new();
  fx.write("V00001_a.sql", "SELECT 1;");
  fx.warehouse.set_unreachable();

  let report = fx.migrator().run(false).await;
  match &report.outcome {
    RunOutcome::AbortedBeforeStart(err) => {
      assert_eq!(err.kind(), ErrorKind::Infrastructure);
      assert!(err.to_string().contains("connection refused"));
    }
    other => panic!("expected abort, got {other:?}"),
  }
  assert!(report.files.is_empty());
  assert!(fx.warehouse.scripts().is_empty());
}

#[tokio::test]
async fn malformed_file_name_aborts_before_touching_the_backend() {
  let fx = Fixture::new();
  fx.write("V00001_a.sql", "SELECT 1;")
    .write("V2_bad.sql", "SELECT 2;");

  let report = fx.migrator().run(false).await;
  match &report.outcome {
    RunOutcome::AbortedBeforeStart(err) => assert_eq!(err.kind(), ErrorKind::Configuration),
    other => panic!("expected abort, got {other:?}"),
  }
  assert_eq!(fx.warehouse.calls(), 0);
  assert_eq!(fx.scheduler.calls(), 0);
}

#[tokio::test]
async fn duplicate_versions_abort_before_touching_the_backend() {
  let fx = Fixture::new();
  fx.write("V00001_a.sql", "SELECT 1;")
    .write("V00001_b.sql", "SELECT 2;");

  let report = fx.migrator().run(false).await;
  match &report.outcome {
    RunOutcome::AbortedBeforeStart(err) => {
      assert_eq!(err.kind(), ErrorKind::Configuration);
      assert_eq!(err.version().map(|v| v.number()), Some(1));
    }
    other => panic!("expected abort, got {other:?}"),
  }
  assert_eq!(fx.warehouse.calls(), 0);
}

// ─── Dry run ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn dry_run_classifies_like_a_real_run_without_side_effects() {
  let fx = Fixture::new();
  fx.write("V00001_create_table.sql", CREATE_TABLE);
  assert!(fx.migrator().run(false).await.is_success());

  fx.write("V00002_create_view.sql", CREATE_VIEW)
    .write("V00003_cleanup.sql", CLEANUP);

  let scripts_before = fx.warehouse.scripts().len();
  let writes_before = fx.warehouse.ledger_writes();

  let dry = fx.migrator().run(true).await;
  assert!(dry.is_success());
  assert!(dry.dry_run);
  assert_eq!(
    states(&dry),
    vec![FileState::Skipped, FileState::WouldApply, FileState::WouldApply]
  );
  let modes: Vec<Mode> = dry.files.iter().map(|f| f.mode).collect();
  assert_eq!(modes, vec![Mode::Direct, Mode::Direct, Mode::Scheduled]);

  assert_eq!(fx.warehouse.scripts().len(), scripts_before);
  assert_eq!(fx.warehouse.ledger_writes(), writes_before);
  assert_eq!(fx.scheduler.calls(), 0);

  let real = fx.migrator().run(false).await;
  assert!(real.is_success());
  let real_modes: Vec<Mode> = real.files.iter().map(|f| f.mode).collect();
  assert_eq!(real_modes, modes);
  for (d, r) in dry.files.iter().zip(&real.files) {
    match d.state {
      FileState::Skipped => assert_eq!(r.state, FileState::Skipped),
      FileState::WouldApply => assert!(matches!(r.state, FileState::Applied { .. })),
      ref other => panic!("unexpected dry-run state {other:?}"),
    }
  }
}

#[tokio::test]
async fn dry_run_still_detects_drift() {
  let fx = Fixture::new();
  fx.write("V00001_a.sql", "SELECT 1;");
  assert!(fx.migrator().run(false).await.is_success());

  fx.write("V00001_a.sql", "SELECT 11;");
  let report = fx.migrator().run(true).await;
  assert!(matches!(
    report.outcome,
    RunOutcome::AbortedBeforeStart(Error::ChecksumMismatch { .. })
  ));
}

// ─── Routing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn scheduled_and_direct_files_reach_their_own_backends() {
  let fx = Fixture::new();
  fx.write("V00001_direct.sql", "SELECT 1;")
    .write("V00002_sched.sql", "-- @scheduled\nSELECT 2;");

  let report = fx.migrator().run(false).await;
  assert!(report.is_success());
  assert_eq!(fx.warehouse.scripts(), vec!["SELECT 1;"]);
  assert_eq!(fx.scheduler.calls(), 1);

  let jobs = fx.scheduler.jobs();
  let job = &jobs["V00002_sched"];
  assert_eq!(job.query, "SELECT 2;");
  assert_eq!(job.schedule_expression, "every 24 hours");
  assert_eq!(job.location, "US");

  match &report.files[1].state {
    FileState::Applied { job, .. } => {
      assert_eq!(job.as_deref(), Some("transferConfigs/V00002_sched"))
    }
    other => panic!("unexpected state {other:?}"),
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn status_reports_applied_failed_pending_drift_and_orphans() {
  let fx = Fixture::new();
  fx.write("V00001_a.sql", "SELECT 1;")
    .write("V00002_b.sql", "SELECT 2;")
    .write("V00003_c.sql", "SELECT FAIL;")
    .write("V00004_d.sql", "SELECT 4;");
  fx.migrator().run(false).await;

  fs::remove_file(fx.path().join("V00001_a.sql")).unwrap();
  fx.write("V00002_b.sql", "SELECT 22;");

  let status = fx.migrator().status().await.unwrap();
  assert_eq!(status.entries.len(), 3);
  assert!(matches!(
    status.entries[0].state,
    EntryState::Applied { drifted: true, .. }
  ));
  assert!(matches!(
    &status.entries[1].state,
    EntryState::Failed { error: Some(e), .. } if e.contains("Syntax error")
  ));
  assert_eq!(status.entries[2].state, EntryState::Pending);
  assert_eq!(status.pending(), 2);
  assert_eq!(status.drifted(), 1);

  assert_eq!(status.orphans.len(), 1);
  assert_eq!(status.orphans[0].version.number(), 1);
  assert_eq!(status.orphans[0].script_name, "V00001_a.sql");
}

#[tokio::test]
async fn status_never_submits_scripts() {
  let fx = Fixture::new();
  fx.write("V00001_a.sql", "SELECT 1;");
  let status = fx.migrator().status().await.unwrap();
  assert_eq!(status.pending(), 1);
  assert!(fx.warehouse.scripts().is_empty());
  assert_eq!(fx.warehouse.ledger_writes(), 0);
}

#[test]
fn invalid_control_table_is_rejected() {
  let target = Target::new("p", "d", "US").unwrap();
  let settings = Settings::new(target).with_control_table("bad-name");
  let result = Migrator::new(settings, MockWarehouse::default(), MockScheduler::default());
  assert!(matches!(result, Err(Error::Config(_))));
}
