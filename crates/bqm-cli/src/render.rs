//! Human and JSON rendering of engine reports.

use std::fmt::Write as _;

use bqm_engine::{
  FileState, RunOutcome, RunReport, StatusReport, plan::Mode, status::EntryState,
};
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Output {
  #[default]
  Text,
  Json,
}

fn mode(m: Mode) -> &'static str {
  match m {
    Mode::Direct => "direct",
    Mode::Scheduled => "scheduled",
  }
}

pub fn run_report(report: &RunReport, output: Output) -> anyhow::Result<String> {
  if output == Output::Json {
    return Ok(serde_json::to_string_pretty(report)?);
  }

  let mut out = String::new();
  if report.dry_run {
    writeln!(out, "Dry run: nothing will be executed or recorded.")?;
  }

  for file in &report.files {
    let state = match &file.state {
      FileState::Skipped => "skipped".to_owned(),
      FileState::WouldApply => "would apply".to_owned(),
      FileState::Applied { duration_ms, job: Some(job) } => {
        format!("applied in {duration_ms} ms -> {job}")
      }
      FileState::Applied { duration_ms, job: None } => format!("applied in {duration_ms} ms"),
      FileState::Failed { error } => format!("FAILED: {error}"),
      FileState::NotAttempted => "not attempted".to_owned(),
    };
    writeln!(
      out,
      "{:<8} {:<9} {:<40} {state}",
      file.version.to_string(),
      mode(file.mode),
      file.script_name
    )?;
  }

  match &report.outcome {
    RunOutcome::CompletedAll => {
      let verb = if report.dry_run { "would apply" } else { "applied" };
      writeln!(out, "{} {verb}, {} skipped.", report.changed(), report.skipped())?;
    }
    RunOutcome::StoppedAtFailure { version, cause } => {
      writeln!(out, "Stopped at {version}: {cause}")?;
    }
    RunOutcome::AbortedBeforeStart(cause) => {
      writeln!(out, "Aborted before start: {cause}")?;
    }
  }
  Ok(out)
}

pub fn status_report(report: &StatusReport, output: Output) -> anyhow::Result<String> {
  if output == Output::Json {
    return Ok(serde_json::to_string_pretty(report)?);
  }

  let mut out = String::new();
  for entry in &report.entries {
    let state = match &entry.state {
      EntryState::Applied { applied_at, drifted: false, .. } => {
        format!("applied {}", applied_at.format("%Y-%m-%d %H:%M:%S"))
      }
      EntryState::Applied { applied_at, drifted: true, .. } => {
        format!("applied {} (MODIFIED since)", applied_at.format("%Y-%m-%d %H:%M:%S"))
      }
      EntryState::Failed { applied_at, error } => format!(
        "failed {}: {}",
        applied_at.format("%Y-%m-%d %H:%M:%S"),
        error.as_deref().unwrap_or("unknown error")
      ),
      EntryState::Pending => "pending".to_owned(),
    };
    writeln!(
      out,
      "{:<8} {:<9} {:<40} {state}",
      entry.version.to_string(),
      mode(entry.mode),
      entry.script_name
    )?;
  }

  for orphan in &report.orphans {
    writeln!(
      out,
      "{:<8} {:<9} {:<40} recorded but file missing",
      orphan.version.to_string(),
      "-",
      orphan.script_name
    )?;
  }

  writeln!(
    out,
    "{} files, {} pending, {} modified, {} orphaned.",
    report.entries.len(),
    report.pending(),
    report.drifted(),
    report.orphans.len()
  )?;
  Ok(out)
}
