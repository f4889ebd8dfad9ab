//! Scheduled-query deployment.
//!
//! Turns a scheduled migration into a [`ScheduledJobDefinition`] and hands it
//! to the [`ScheduleBackend`]'s upsert. Schedule expressions are passed
//! through untouched; rejecting a bad one is the backend's job.

use bqm_core::{
  backend::{DeployedJob, ScheduleBackend, ScheduledJobDefinition},
  migration::{MigrationFile, ScheduledMetadata},
  target::Target,
};

pub struct Deployer<'a, D> {
  backend: &'a D,
  target:  &'a Target,
}

impl<'a, D: ScheduleBackend> Deployer<'a, D> {
  pub fn new(backend: &'a D, target: &'a Target) -> Self { Self { backend, target } }

  pub fn definition(
    &self,
    file: &MigrationFile,
    meta: &ScheduledMetadata,
  ) -> ScheduledJobDefinition {
    ScheduledJobDefinition {
      display_name:        meta.display_name.clone(),
      schedule_expression: meta.schedule_expression.clone(),
      description:         meta.description.clone(),
      query:               file.body(self.target),
      project:             self.target.project.clone(),
      destination_dataset: self.target.dataset.clone(),
      location:            self.target.location.clone(),
    }
  }

  /// Create or update the recurring job for `file`.
  pub async fn deploy(
    &self,
    file: &MigrationFile,
    meta: &ScheduledMetadata,
  ) -> Result<DeployedJob, D::Error> {
    let def = self.definition(file, meta);
    let job = self.backend.upsert(&def).await?;
    tracing::info!(
      display_name = %def.display_name,
      schedule = %def.schedule_expression,
      job = %job.name,
      created = job.created,
      "scheduled query deployed"
    );
    Ok(job)
  }
}
