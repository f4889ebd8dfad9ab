//! Layered configuration for the `bqm` binary.
//!
//! Lowest to highest precedence: built-in defaults, the TOML file, legacy
//! `GCP_*` variables, `BQM_*` variables, command-line flags.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use bqm_core::{
  ledger::DEFAULT_CONTROL_TABLE,
  migration::{DEFAULT_SCHEDULE, DEFAULT_VERSION_WIDTH, ParseOptions},
  target::Target,
};
use bqm_engine::{Settings, config::DEFAULT_MIGRATIONS_DIR};
use clap::ValueEnum;
use config::{Config, ConfigError, Environment, File, Map, Source, Value};
use serde::Deserialize;

pub const DEFAULT_LOCATION: &str = "US";
pub const DEFAULT_SQLITE_PATH: &str = "bqm.sqlite3";

/// Variables read by earlier tooling, mapped to their config keys.
const LEGACY_VARS: &[(&str, &str)] = &[
  ("GCP_PROJECT_ID", "project"),
  ("GCP_DATASET_ID", "dataset"),
  ("GCP_LOCATION", "location"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
  /// BigQuery and the Data Transfer API.
  #[default]
  Bigquery,
  /// Local SQLite emulation.
  Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub project:          Option<String>,
  pub dataset:          Option<String>,
  pub location:         String,
  pub migrations_dir:   PathBuf,
  pub control_table:    String,
  pub version_width:    usize,
  pub default_schedule: String,
  pub backend:          BackendKind,
  pub sqlite_path:      PathBuf,
  pub credentials_dir:  PathBuf,
  /// Pre-issued OAuth token; skips service-account discovery when set.
  pub access_token:     Option<String>,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      project:          None,
      dataset:          None,
      location:         DEFAULT_LOCATION.to_owned(),
      migrations_dir:   PathBuf::from(DEFAULT_MIGRATIONS_DIR),
      control_table:    DEFAULT_CONTROL_TABLE.to_owned(),
      version_width:    DEFAULT_VERSION_WIDTH,
      default_schedule: DEFAULT_SCHEDULE.to_owned(),
      backend:          BackendKind::default(),
      sqlite_path:      PathBuf::from(DEFAULT_SQLITE_PATH),
      credentials_dir:  PathBuf::from(bqm_bigquery::credentials::DEFAULT_CREDENTIALS_DIR),
      access_token:     None,
    }
  }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
  pub project:        Option<String>,
  pub dataset:        Option<String>,
  pub location:       Option<String>,
  pub migrations_dir: Option<PathBuf>,
  pub backend:        Option<BackendKind>,
  pub sqlite_path:    Option<PathBuf>,
}

/// `GCP_*` variables as a config source, captured at construction.
#[derive(Debug, Clone)]
struct LegacyEnv(Map<String, Value>);

impl LegacyEnv {
  fn capture(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let mut map = Map::new();
    for (var, key) in LEGACY_VARS {
      if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
        map.insert((*key).to_owned(), Value::new(Some(&(*var).to_owned()), value));
      }
    }
    Self(map)
  }
}

impl Source for LegacyEnv {
  fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> { Box::new(self.clone()) }

  fn collect(&self) -> Result<Map<String, Value>, ConfigError> { Ok(self.0.clone()) }
}

fn path_str(path: &Path) -> String { path.to_string_lossy().into_owned() }

impl AppConfig {
  /// Read the file at `path` (optional), the environment and `overrides`.
  pub fn load(path: &Path, overrides: &Overrides) -> anyhow::Result<Self> {
    Self::load_with(path, overrides, |var| std::env::var(var).ok())
  }

  fn load_with(
    path: &Path,
    overrides: &Overrides,
    lookup: impl Fn(&str) -> Option<String>,
  ) -> anyhow::Result<Self> {
    let backend = overrides.backend.map(|b| match b {
      BackendKind::Bigquery => "bigquery",
      BackendKind::Sqlite => "sqlite",
    });

    let settings = Config::builder()
      .add_source(File::from(path).required(false))
      .add_source(LegacyEnv::capture(lookup))
      .add_source(Environment::with_prefix("BQM"))
      .set_override_option("project", overrides.project.clone())?
      .set_override_option("dataset", overrides.dataset.clone())?
      .set_override_option("location", overrides.location.clone())?
      .set_override_option("migrations_dir", overrides.migrations_dir.as_deref().map(path_str))?
      .set_override_option("backend", backend)?
      .set_override_option("sqlite_path", overrides.sqlite_path.as_deref().map(path_str))?
      .build()
      .with_context(|| format!("failed to read configuration from {}", path.display()))?;

    settings
      .try_deserialize()
      .context("failed to deserialise configuration")
  }

  /// Engine settings. `fallback_project` fills in a missing project, e.g.
  /// from the service-account key.
  pub fn engine_settings(&self, fallback_project: Option<&str>) -> anyhow::Result<Settings> {
    let project = self.project.as_deref().or(fallback_project).unwrap_or_default();
    let dataset = self.dataset.as_deref().unwrap_or_default();

    let target = Target::new(project, dataset, self.location.as_str())
      .context("invalid target (set project and dataset in bqm.toml, BQM_* or flags)")?;

    Ok(
      Settings::new(target)
        .with_migrations_dir(&self.migrations_dir)
        .with_control_table(&self.control_table)
        .with_parse_options(ParseOptions {
          version_width:    self.version_width,
          default_schedule: self.default_schedule.clone(),
        }),
    )
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  fn no_env(_: &str) -> Option<String> { None }

  #[test]
  fn defaults_apply_without_file() {
    let dir = tempfile::tempdir().unwrap();
    let cfg =
      AppConfig::load_with(&dir.path().join("missing.toml"), &Overrides::default(), no_env)
        .unwrap();
    assert_eq!(cfg.location, "US");
    assert_eq!(cfg.control_table, "schema_migrations");
    assert_eq!(cfg.version_width, 5);
    assert_eq!(cfg.backend, BackendKind::Bigquery);
    assert!(cfg.project.is_none());
  }

  #[test]
  fn file_then_legacy_env_then_flags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bqm.toml");
    fs::write(
      &path,
      "project = \"from-file\"\ndataset = \"file_ds\"\nbackend = \"sqlite\"\nversion_width = 4\n",
    )
    .unwrap();

    let env = |var: &str| match var {
      "GCP_DATASET_ID" => Some("env_ds".to_owned()),
      "GCP_LOCATION" => Some("EU".to_owned()),
      _ => None,
    };
    let overrides = Overrides { location: Some("asia-northeast1".into()), ..Default::default() };

    let cfg = AppConfig::load_with(&path, &overrides, env).unwrap();
    assert_eq!(cfg.project.as_deref(), Some("from-file"));
    assert_eq!(cfg.dataset.as_deref(), Some("env_ds"));
    assert_eq!(cfg.location, "asia-northeast1");
    assert_eq!(cfg.backend, BackendKind::Sqlite);
    assert_eq!(cfg.version_width, 4);
  }

  #[test]
  fn engine_settings_require_project_and_dataset() {
    let cfg = AppConfig { dataset: Some("ds".into()), ..Default::default() };
    assert!(cfg.engine_settings(None).is_err());

    let settings = cfg.engine_settings(Some("key-project")).unwrap();
    assert_eq!(settings.target.project, "key-project");
    assert_eq!(settings.target.location, "US");
  }

  #[test]
  fn invalid_dataset_is_rejected() {
    let cfg = AppConfig {
      project: Some("p".into()),
      dataset: Some("bad-dataset".into()),
      ..Default::default()
    };
    let err = cfg.engine_settings(None).unwrap_err();
    assert!(format!("{err:#}").contains("dataset"));
  }
}
