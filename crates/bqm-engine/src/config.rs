//! Engine settings. Defaults for the target itself belong to the caller; only
//! repository conventions have defaults here.

use std::path::PathBuf;

use bqm_core::{
  ledger::DEFAULT_CONTROL_TABLE,
  migration::ParseOptions,
  target::{Target, validate_table_name},
};

use crate::Result;

pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Everything a [`Migrator`](crate::Migrator) needs besides its backends.
#[derive(Debug, Clone)]
pub struct Settings {
  pub target:         Target,
  pub migrations_dir: PathBuf,
  /// Unqualified control table name; lives in the target dataset.
  pub control_table:  String,
  pub parse:          ParseOptions,
}

impl Settings {
  pub fn new(target: Target) -> Self {
    Self {
      target,
      migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
      control_table: DEFAULT_CONTROL_TABLE.to_owned(),
      parse: ParseOptions::default(),
    }
  }

  pub fn with_migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.migrations_dir = dir.into();
    self
  }

  pub fn with_control_table(mut self, table: impl Into<String>) -> Self {
    self.control_table = table.into();
    self
  }

  pub fn with_parse_options(mut self, parse: ParseOptions) -> Self {
    self.parse = parse;
    self
  }

  pub(crate) fn validate(&self) -> Result<()> {
    validate_table_name("control_table", &self.control_table)?;
    if !(1..=9).contains(&self.parse.version_width) {
      return Err(
        bqm_core::Error::InvalidIdentifier {
          field:  "version_width",
          value:  self.parse.version_width.to_string(),
          reason: "must be between 1 and 9",
        }
        .into(),
      );
    }
    Ok(())
  }
}
