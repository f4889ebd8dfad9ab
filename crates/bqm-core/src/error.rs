//! Error types for `bqm-core`.

use thiserror::Error;

use crate::migration::Version;

#[derive(Debug, Error)]
pub enum Error {
  #[error(
    "invalid migration file name {name:?}: {reason} \
     (expected 'V' + {width} digits + '_description.sql')"
  )]
  InvalidFileName {
    name:   String,
    reason: String,
    width:  usize,
  },

  #[error("duplicate migration version {version}: {first:?} and {second:?}")]
  DuplicateVersion {
    version: Version,
    first:   String,
    second:  String,
  },

  #[error("missing required configuration value: {0}")]
  MissingConfig(&'static str),

  #[error("invalid {field} identifier {value:?}: {reason}")]
  InvalidIdentifier {
    field:  &'static str,
    value:  String,
    reason: &'static str,
  },

  #[error("invalid version token {0:?}")]
  InvalidVersion(String),

  #[error("invalid checksum {0:?}: expected 64 lowercase hex characters")]
  InvalidChecksum(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
