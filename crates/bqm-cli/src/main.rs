//! `bqm`: apply versioned SQL migrations to a BigQuery dataset.
//!
//! Reads `bqm.toml` (or the path given with `--config`), the environment and
//! a `.env` file, then reports status or runs pending migrations against
//! BigQuery or a local SQLite emulation.

mod render;
mod settings;

use std::{path::PathBuf, process::ExitCode};

use anyhow::Context as _;
use bqm_bigquery::{
  BigQueryBackend, DataTransferBackend, GoogleClient,
  credentials::{self, CREDENTIALS_ENV},
};
use bqm_core::backend::{QueryBackend, ScheduleBackend};
use bqm_engine::{Migrator, RunReport, Settings};
use bqm_store_sqlite::SqliteWarehouse;
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{
  render::Output,
  settings::{AppConfig, BackendKind, Overrides},
};

#[derive(Parser)]
#[command(author, version, about = "Versioned SQL migrations for BigQuery")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "bqm.toml", env = "BQM_CONFIG", global = true)]
  config: PathBuf,

  /// Target project id.
  #[arg(long, global = true)]
  project: Option<String>,

  /// Target dataset.
  #[arg(long, global = true)]
  dataset: Option<String>,

  /// Dataset location, e.g. `US` or `europe-west2`.
  #[arg(long, global = true)]
  location: Option<String>,

  /// Directory holding `V{version}_{description}.sql` files.
  #[arg(long, global = true)]
  migrations_dir: Option<PathBuf>,

  #[arg(long, value_enum, global = true)]
  backend: Option<BackendKind>,

  /// Database file for the SQLite backend.
  #[arg(long, global = true)]
  sqlite_path: Option<PathBuf>,

  #[arg(long, value_enum, default_value_t = Output::Text, global = true)]
  output: Output,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Show applied, failed, pending and orphaned migrations.
  Status,
  /// Apply pending migrations in version order, stopping at the first failure.
  Run {
    /// Classify files without executing, deploying or recording anything.
    #[arg(long)]
    dry_run: bool,

    /// Exit 0 when nothing was pending, 2 when migrations were applied (or
    /// would be), 1 on failure.
    #[arg(long)]
    detailed_exitcode: bool,
  },
}

impl Cli {
  fn overrides(&self) -> Overrides {
    Overrides {
      project:        self.project.clone(),
      dataset:        self.dataset.clone(),
      location:       self.location.clone(),
      migrations_dir: self.migrations_dir.clone(),
      backend:        self.backend,
      sqlite_path:    self.sqlite_path.clone(),
    }
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  dotenvy::dotenv().ok();

  // Logs go to stderr; reports go to stdout.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let app = AppConfig::load(&cli.config, &cli.overrides())?;

  match app.backend {
    BackendKind::Sqlite => {
      let settings = app.engine_settings(None)?;
      let store = SqliteWarehouse::open(&app.sqlite_path)
        .await
        .with_context(|| format!("failed to open {}", app.sqlite_path.display()))?;
      tracing::info!(path = %app.sqlite_path.display(), "using SQLite backend");
      let migrator = Migrator::new(settings, store.clone(), store)?;
      dispatch(&migrator, &cli.command, cli.output).await
    }
    BackendKind::Bigquery => {
      let (client, key_project) = google_client(&app)?;
      let settings: Settings = app.engine_settings(key_project.as_deref())?;
      let query = BigQueryBackend::new(client.clone(), settings.target.project.clone());
      let scheduler = DataTransferBackend::new(client);
      let migrator = Migrator::new(settings, query, scheduler)?;
      dispatch(&migrator, &cli.command, cli.output).await
    }
  }
}

/// Authenticated client plus the key's project id, if a key was used.
fn google_client(app: &AppConfig) -> anyhow::Result<(GoogleClient, Option<String>)> {
  if let Some(token) = app.access_token.as_deref().filter(|t| !t.is_empty()) {
    return Ok((GoogleClient::with_token(token)?, None));
  }

  let env_value = std::env::var(CREDENTIALS_ENV).ok();
  let (path, key) = credentials::discover(env_value.as_deref(), &app.credentials_dir)?;
  tracing::info!(path = %path.display(), account = %key.client_email, "using service account");
  let project = key.project_id.clone();
  Ok((GoogleClient::with_service_account(key)?, project))
}

async fn dispatch<Q, D>(
  migrator: &Migrator<Q, D>,
  command: &Command,
  output: Output,
) -> anyhow::Result<ExitCode>
where
  Q: QueryBackend,
  D: ScheduleBackend,
{
  match command {
    Command::Status => {
      let report = migrator.status().await?;
      print!("{}", render::status_report(&report, output)?);
      Ok(ExitCode::SUCCESS)
    }
    Command::Run { dry_run, detailed_exitcode } => {
      let report = migrator.run(*dry_run).await;
      print!("{}", render::run_report(&report, output)?);
      Ok(exit_code(&report, *detailed_exitcode))
    }
  }
}

fn exit_code(report: &RunReport, detailed: bool) -> ExitCode {
  if !report.is_success() {
    ExitCode::FAILURE
  } else if detailed && report.changed() > 0 {
    ExitCode::from(2)
  } else {
    ExitCode::SUCCESS
  }
}
