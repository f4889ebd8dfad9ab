//! Conversions between engine parameter/row types and SQLite values.
//!
//! Booleans are stored as `0`/`1`. Timestamps bound as parameters are stored
//! as `YYYY-MM-DD HH:MM:SS.ffffff+00:00`, the text form BigQuery itself
//! prints, so ledger rows read back the same way from either backend.

use bqm_core::backend::ParamValue;
use chrono::{DateTime, Utc};
use rusqlite::types::{Value, ValueRef};

use crate::{Error, Result};

pub fn encode_param(value: &ParamValue) -> Value {
  match value {
    ParamValue::String(Some(s)) => Value::Text(s.clone()),
    ParamValue::String(None) => Value::Null,
    ParamValue::Int64(i) => Value::Integer(*i),
    ParamValue::Bool(b) => Value::Integer(i64::from(*b)),
    ParamValue::Timestamp(ts) => Value::Text(encode_ts(*ts)),
  }
}

pub fn encode_ts(ts: DateTime<Utc>) -> String {
  ts.format("%Y-%m-%d %H:%M:%S%.6f+00:00").to_string()
}

/// Render a column value as text; `None` for NULL. Blobs come back as hex.
pub fn decode_value(value: ValueRef<'_>) -> Option<String> {
  match value {
    ValueRef::Null => None,
    ValueRef::Integer(i) => Some(i.to_string()),
    ValueRef::Real(f) => Some(f.to_string()),
    ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
    ValueRef::Blob(b) => Some(hex::encode(b)),
  }
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}
