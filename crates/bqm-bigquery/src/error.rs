//! Error type for `bqm-bigquery`.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(
    "no service account key found: set GOOGLE_APPLICATION_CREDENTIALS or place one JSON key \
     in {0:?}"
  )]
  NoCredentials(PathBuf),

  #[error(
    "multiple JSON files in {dir:?} ({}); set GOOGLE_APPLICATION_CREDENTIALS to choose one",
    .files.join(", ")
  )]
  AmbiguousCredentials { dir: PathBuf, files: Vec<String> },

  #[error("cannot read credentials {path:?}: {source}")]
  ReadCredentials {
    path:   PathBuf,
    source: std::io::Error,
  },

  #[error("invalid service account key {path:?}: {source}")]
  InvalidKey {
    path:   PathBuf,
    source: serde_json::Error,
  },

  #[error("cannot sign token request: {0}")]
  Jwt(#[from] jsonwebtoken::errors::Error),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// Non-2xx response; `message` is Google's error message when present.
  #[error("{context} returned {status}: {message}")]
  Api {
    context: String,
    status:  u16,
    message: String,
  },

  #[error("query job {job_id} failed: {message}")]
  Job { job_id: String, message: String },

  #[error("query job {job_id} did not finish within {waited:?}")]
  Timeout { job_id: String, waited: Duration },

  #[error("unexpected response: {0}")]
  Decode(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
