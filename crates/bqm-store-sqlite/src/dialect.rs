//! BigQuery type names that SQLite would give the wrong column affinity.
//!
//! SQLite reads `STRING` as NUMERIC affinity, so text such as `"0123"` would
//! be stored as the integer 123. The word is rewritten to `TEXT` everywhere
//! outside quotes and comments, which also covers `CAST(x AS STRING)`.

/// Rewrite `STRING` (any case, whole word) to `TEXT`.
pub fn translate(sql: &str) -> String {
  let bytes = sql.as_bytes();
  let mut out = String::with_capacity(sql.len());
  let mut i = 0;

  while i < bytes.len() {
    let rest = &sql[i..];
    let end = match bytes[i] {
      q @ (b'\'' | b'"' | b'`') => i + 1 + quoted_len(&bytes[i + 1..], q),
      b'-' if rest.starts_with("--") => line_end(sql, i),
      b'#' => line_end(sql, i),
      b'/' if rest.starts_with("/*") => rest.find("*/").map_or(sql.len(), |n| i + n + 2),
      b if b.is_ascii_alphabetic() || b == b'_' => {
        let len = rest
          .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
          .unwrap_or(rest.len());
        let word = &rest[..len];
        out.push_str(if word.eq_ignore_ascii_case("STRING") { "TEXT" } else { word });
        i += len;
        continue;
      }
      _ => i + rest.chars().next().map_or(1, char::len_utf8),
    };
    out.push_str(&sql[i..end]);
    i = end;
  }
  out
}

fn line_end(sql: &str, from: usize) -> usize {
  sql[from..].find('\n').map_or(sql.len(), |n| from + n)
}

/// Length up to and including the closing `quote`. A backslash escapes the
/// next byte.
fn quoted_len(bytes: &[u8], quote: u8) -> usize {
  let mut i = 0;
  while i < bytes.len() {
    match bytes[i] {
      b'\\' => i += 2,
      b if b == quote => return i + 1,
      _ => i += 1,
    }
  }
  bytes.len()
}
