//! Error type for `bqm-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("invalid schedule {0:?}: expected e.g. \"every 24 hours\" or \"first monday of month 09:00\"")]
  InvalidSchedule(String),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
