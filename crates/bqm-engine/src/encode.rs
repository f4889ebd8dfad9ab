//! Decoding helpers between control-table rows and [`LedgerRecord`].
//!
//! Backends render every value as text. Timestamps arrive in one of three
//! shapes depending on the backend: epoch seconds as a float (`1.7e9`, the
//! BigQuery REST encoding), `YYYY-MM-DD HH:MM:SS[.ffffff]+00[:00]`, or
//! RFC 3339. Booleans arrive as `true`/`false` or `1`/`0`.

use bqm_core::{
  backend::Row, checksum::ChecksumDigest, ledger::LedgerRecord, migration::Version,
};
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{Error, Result};

fn required<'r>(row: &'r Row, column: &str) -> Result<&'r str> {
  row
    .get(column)
    .ok_or_else(|| Error::MalformedRecord(format!("missing {column}")))
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn decode_ts(s: &str) -> Result<DateTime<Utc>> {
  let s = s.trim();

  if let Ok(secs) = s.parse::<f64>() {
    let micros = (secs * 1_000_000.0).round() as i64;
    return DateTime::from_timestamp_micros(micros)
      .ok_or_else(|| Error::MalformedRecord(format!("timestamp out of range: {s}")));
  }

  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }

  for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
    if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
      return Ok(dt.with_timezone(&Utc));
    }
  }

  NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
    .map(|naive| naive.and_utc())
    .map_err(|e| Error::MalformedRecord(format!("timestamp {s:?}: {e}")))
}

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn decode_bool(s: &str) -> Result<bool> {
  match s.trim().to_ascii_lowercase().as_str() {
    "true" | "1" => Ok(true),
    "false" | "0" => Ok(false),
    other => Err(Error::MalformedRecord(format!("boolean {other:?}"))),
  }
}

pub fn decode_i64(s: &str) -> Result<i64> {
  let s = s.trim();
  s.parse::<i64>()
    .or_else(|_| s.parse::<f64>().map(|f| f as i64))
    .map_err(|_| Error::MalformedRecord(format!("integer {s:?}")))
}

// ─── Row ─────────────────────────────────────────────────────────────────────

pub fn decode_record(row: &Row) -> Result<LedgerRecord> {
  Ok(LedgerRecord {
    version:       Version::parse_token(required(row, "version")?)?,
    script_name:   row.get("script_name").unwrap_or_default().to_owned(),
    checksum:      ChecksumDigest::parse(required(row, "checksum")?)?,
    applied_at:    decode_ts(required(row, "applied_at")?)?,
    duration_ms:   row.get("duration_ms").map(decode_i64).transpose()?.unwrap_or(0),
    success:       decode_bool(required(row, "success")?)?,
    error_message: row.get("error_message").map(str::to_owned),
  })
}
