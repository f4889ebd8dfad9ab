//! Error type for `bqm-engine`.

use std::path::PathBuf;

use bqm_core::{checksum::ChecksumDigest, migration::Version};
use serde::Serialize;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed file name, duplicate version, missing or invalid settings.
  #[error(transparent)]
  Config(#[from] bqm_core::Error),

  #[error("cannot read migrations directory {path:?}: {source}")]
  Discovery {
    path:   PathBuf,
    source: std::io::Error,
  },

  #[error("cannot read migration script {path:?}: {source}")]
  ReadScript {
    path:   PathBuf,
    source: std::io::Error,
  },

  #[error(
    "checksum mismatch for {version} ({script_name}): ledger recorded {recorded}, \
     file now hashes to {current}; an applied migration was modified"
  )]
  ChecksumMismatch {
    version:     Version,
    script_name: String,
    recorded:    ChecksumDigest,
    current:     ChecksumDigest,
  },

  #[error("ledger {operation} failed: {source}")]
  Ledger {
    operation: &'static str,
    #[source]
    source:    BoxError,
  },

  #[error("malformed ledger row: {0}")]
  MalformedRecord(String),

  #[error("{version} ({script_name}) failed: {source}")]
  Execution {
    version:     Version,
    script_name: String,
    #[source]
    source:      BoxError,
  },

  #[error("{version} ({script_name}) scheduled query deployment failed: {source}")]
  Deployment {
    version:     Version,
    script_name: String,
    #[source]
    source:      BoxError,
  },
}

/// Coarse classification of [`Error`], for reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  Configuration,
  Integrity,
  Execution,
  Deployment,
  Infrastructure,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Error::Config(_) | Error::Discovery { .. } | Error::ReadScript { .. } => {
        ErrorKind::Configuration
      }
      Error::ChecksumMismatch { .. } => ErrorKind::Integrity,
      Error::Ledger { .. } | Error::MalformedRecord(_) => ErrorKind::Infrastructure,
      Error::Execution { .. } => ErrorKind::Execution,
      Error::Deployment { .. } => ErrorKind::Deployment,
    }
  }

  /// The migration version the error is about, when there is one.
  pub fn version(&self) -> Option<Version> {
    match self {
      Error::Config(bqm_core::Error::DuplicateVersion { version, .. })
      | Error::ChecksumMismatch { version, .. }
      | Error::Execution { version, .. }
      | Error::Deployment { version, .. } => Some(*version),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
