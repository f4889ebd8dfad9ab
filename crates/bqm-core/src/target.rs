//! The warehouse location a run is aimed at.
//!
//! Identifier formats are checked up front so that substituted values can
//! never contain placeholder syntax (`$`, `{`, `}`) or break out of a
//! backtick-quoted table path.

use serde::Serialize;

use crate::{Error, Result};

/// Project, dataset and location for a migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
  pub project:  String,
  pub dataset:  String,
  pub location: String,
}

impl Target {
  /// Build a validated target. All three values are required.
  pub fn new(
    project: impl Into<String>,
    dataset: impl Into<String>,
    location: impl Into<String>,
  ) -> Result<Self> {
    let project = project.into();
    let dataset = dataset.into();
    let location = location.into();

    if project.trim().is_empty() {
      return Err(Error::MissingConfig("project"));
    }
    if dataset.trim().is_empty() {
      return Err(Error::MissingConfig("dataset"));
    }
    if location.trim().is_empty() {
      return Err(Error::MissingConfig("location"));
    }

    validate_project(&project)?;
    validate_table_name("dataset", &dataset)?;
    validate_location(&location)?;

    Ok(Self { project, dataset, location })
  }

  /// Fully-qualified, backtick-quoted path of `table` inside this target,
  /// e.g. `` `my-project.analytics.schema_migrations` ``.
  pub fn qualify(&self, table: &str) -> String {
    format!("`{}.{}.{}`", self.project, self.dataset, table)
  }
}

/// Project ids: lowercase letters, digits and hyphens. Domain-scoped ids
/// (`example.com:my-project`) additionally contain `.` and `:`.
fn validate_project(value: &str) -> Result<()> {
  let ok = value
    .chars()
    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.' | ':'));
  if !ok {
    return Err(Error::InvalidIdentifier {
      field:  "project",
      value:  value.to_owned(),
      reason: "only lowercase letters, digits, '-', '.' and ':' are allowed",
    });
  }
  Ok(())
}

/// Dataset and table names: letters, digits and underscores.
pub fn validate_table_name(field: &'static str, value: &str) -> Result<()> {
  if value.is_empty() {
    return Err(Error::MissingConfig(field));
  }
  if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
    return Err(Error::InvalidIdentifier {
      field,
      value: value.to_owned(),
      reason: "only letters, digits and '_' are allowed",
    });
  }
  Ok(())
}

fn validate_location(value: &str) -> Result<()> {
  if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
    return Err(Error::InvalidIdentifier {
      field:  "location",
      value:  value.to_owned(),
      reason: "only letters, digits and '-' are allowed",
    });
  }
  Ok(())
}
