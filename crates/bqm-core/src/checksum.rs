//! Content checksums recorded in the ledger.
//!
//! Digests are SHA-256 over the substituted script, hex-encoded.

use std::fmt;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// A 64-character lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChecksumDigest(String);

impl ChecksumDigest {
  /// Hash `content` as UTF-8 bytes.
  pub fn of(content: &str) -> Self {
    let hash = Sha256::digest(content.as_bytes());
    Self(hex::encode(hash))
  }

  /// Accept a digest read back from storage. Uppercase input is normalised.
  pub fn parse(s: &str) -> Result<Self> {
    let s = s.trim();
    if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
      return Err(Error::InvalidChecksum(s.to_owned()));
    }
    Ok(Self(s.to_ascii_lowercase()))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ChecksumDigest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl Serialize for ChecksumDigest {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn known_digest() {
    // echo -n "hello" | sha256sum
    assert_eq!(
      ChecksumDigest::of("hello").as_str(),
      "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
  }

  #[test]
  fn empty_input_is_still_64_chars() {
    assert_eq!(ChecksumDigest::of("").as_str().len(), 64);
  }

  #[test]
  fn one_byte_changes_the_digest() {
    assert_ne!(
      ChecksumDigest::of("SELECT 1;"),
      ChecksumDigest::of("SELECT 2;")
    );
  }

  #[test]
  fn parse_normalises_case_and_rejects_garbage() {
    let upper = ChecksumDigest::of("abc").as_str().to_ascii_uppercase();
    assert_eq!(ChecksumDigest::parse(&upper).unwrap(), ChecksumDigest::of("abc"));

    assert!(ChecksumDigest::parse("not-a-digest").is_err());
    assert!(ChecksumDigest::parse(&"a".repeat(63)).is_err());
  }
}
