//! Migration files: naming contract, directive header, ordering.
//!
//! Pipeline:
//!   file name + content
//!     └─ parse_file_name()   → (Version, description)
//!     └─ scan_header()       → Option<Header>   (scheduled directives)
//!          └─ MigrationFile
//!               └─ order_by_version() → Vec<MigrationFile> (sorted, unique)

use std::{cmp::Ordering, fmt, hash::Hash, path::PathBuf};

use serde::{Serialize, Serializer};

use crate::{
  Error, Result, checksum::ChecksumDigest, placeholder::substitute, target::Target,
};

/// Leading line that routes a script to the scheduled-query backend.
pub const SCHEDULED_MARKER: &str = "-- @scheduled";

pub const DEFAULT_VERSION_WIDTH: usize = 5;
pub const DEFAULT_SCHEDULE: &str = "every 24 hours";

// ─── Version ─────────────────────────────────────────────────────────────────

/// A migration version such as `V00042`.
///
/// Equality, hashing and ordering use the numeric value only; the digit width
/// is kept so the version renders exactly as it was written.
#[derive(Debug, Clone, Copy)]
pub struct Version {
  number: u32,
  width:  usize,
}

impl Version {
  pub fn new(number: u32, width: usize) -> Self { Self { number, width } }

  pub fn number(&self) -> u32 { self.number }

  /// Parse a stored token (`V00042`) of any width.
  pub fn parse_token(s: &str) -> Result<Self> {
    let digits = s
      .trim()
      .strip_prefix('V')
      .ok_or_else(|| Error::InvalidVersion(s.to_owned()))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
      return Err(Error::InvalidVersion(s.to_owned()));
    }
    let number = digits
      .parse()
      .map_err(|_| Error::InvalidVersion(s.to_owned()))?;
    Ok(Self { number, width: digits.len() })
  }
}

impl PartialEq for Version {
  fn eq(&self, other: &Self) -> bool { self.number == other.number }
}

impl Eq for Version {}

impl Hash for Version {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) { self.number.hash(state) }
}

impl PartialOrd for Version {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Version {
  fn cmp(&self, other: &Self) -> Ordering { self.number.cmp(&other.number) }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "V{:0width$}", self.number, width = self.width)
  }
}

impl Serialize for Version {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

// ─── Parse options ───────────────────────────────────────────────────────────

/// Repository-wide parsing conventions.
#[derive(Debug, Clone)]
pub struct ParseOptions {
  /// Number of digits after the `V` prefix; fixed across a repository.
  pub version_width:    usize,
  /// Schedule used when a scheduled script has no `@schedule` line.
  pub default_schedule: String,
}

impl Default for ParseOptions {
  fn default() -> Self {
    Self {
      version_width:    DEFAULT_VERSION_WIDTH,
      default_schedule: DEFAULT_SCHEDULE.to_owned(),
    }
  }
}

// ─── File name ───────────────────────────────────────────────────────────────

/// Split `V{digits}_{description}.sql` into its version and description.
pub fn parse_file_name(name: &str, width: usize) -> Result<(Version, String)> {
  let invalid = |reason: &str| Error::InvalidFileName {
    name: name.to_owned(),
    reason: reason.to_owned(),
    width,
  };

  let stem = name
    .strip_suffix(".sql")
    .ok_or_else(|| invalid("missing .sql extension"))?;
  let rest = stem
    .strip_prefix('V')
    .ok_or_else(|| invalid("missing 'V' prefix"))?;
  let (digits, description) = rest
    .split_once('_')
    .ok_or_else(|| invalid("missing '_' after the version"))?;

  if digits.len() != width || !digits.chars().all(|c| c.is_ascii_digit()) {
    return Err(invalid(&format!("version must be exactly {width} digits")));
  }
  if description.is_empty() {
    return Err(invalid("empty description"));
  }

  let number = digits
    .parse()
    .map_err(|_| invalid("version out of range"))?;

  Ok((Version::new(number, width), description.to_owned()))
}

// ─── Directive header ────────────────────────────────────────────────────────

/// Metadata for a script deployed as a recurring job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledMetadata {
  pub display_name:        String,
  pub schedule_expression: String,
  pub description:         String,
}

/// Raw result of scanning a scheduled script's leading comment block.
struct Header<'a> {
  fields:      Vec<(&'a str, &'a str)>,
  /// Byte offset of the first line after the header.
  body_offset: usize,
}

impl Header<'_> {
  fn get(&self, key: &str) -> Option<&str> {
    self
      .fields
      .iter()
      .rev()
      .find(|(k, _)| *k == key)
      .map(|(_, v)| *v)
  }
}

fn is_marker(line: &str) -> bool {
  line.strip_prefix(SCHEDULED_MARKER).is_some_and(|rest| {
    rest.is_empty() || rest.starts_with(char::is_whitespace) || rest.starts_with(':')
  })
}

/// Parse `-- @key: value`. Keys are word characters; values are trimmed and
/// must be non-empty.
fn parse_directive(line: &str) -> Option<(&str, &str)> {
  let rest = line.strip_prefix("--")?.trim_start().strip_prefix('@')?;
  let (key, value) = rest.split_once(':')?;
  let key = key.trim_end();
  let value = value.trim();
  let word = |c: char| c.is_ascii_alphanumeric() || c == '_';
  if key.is_empty() || !key.chars().all(word) || value.is_empty() {
    return None;
  }
  Some((key, value))
}

/// Return the directive header if the first non-blank line is the marker.
/// The header is the contiguous run of `--` lines starting at the marker.
fn scan_header(content: &str) -> Option<Header<'_>> {
  let mut offset = 0usize;
  let mut lines = content.split_inclusive('\n').peekable();

  while let Some(line) = lines.next_if(|l| l.trim().is_empty()) {
    offset += line.len();
  }

  let first = lines.next()?;
  if !is_marker(first.trim()) {
    return None;
  }
  offset += first.len();

  let mut fields = Vec::new();
  while let Some(line) = lines.next_if(|l| l.trim_start().starts_with("--")) {
    offset += line.len();
    if let Some(field) = parse_directive(line.trim()) {
      fields.push(field);
    }
  }

  Some(Header { fields, body_offset: offset })
}

// ─── MigrationFile ───────────────────────────────────────────────────────────

/// One script on disk. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct MigrationFile {
  pub version:     Version,
  pub description: String,
  /// File name, e.g. `V00001_create_orders.sql`.
  pub script_name: String,
  pub path:        PathBuf,
  pub raw_content: String,
  /// `Some` iff the script starts with the [`SCHEDULED_MARKER`] line.
  pub scheduled:   Option<ScheduledMetadata>,
  body_offset:     usize,
}

impl MigrationFile {
  /// Parse a script from its file name and literal content.
  pub fn parse(
    path: impl Into<PathBuf>,
    raw_content: String,
    opts: &ParseOptions,
  ) -> Result<Self> {
    let path = path.into();
    let script_name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    let (version, description) = parse_file_name(&script_name, opts.version_width)?;

    let (scheduled, body_offset) = match scan_header(&raw_content) {
      Some(header) => {
        let stem = script_name.trim_end_matches(".sql");
        let meta = ScheduledMetadata {
          display_name:        header
            .get("display_name")
            .unwrap_or(stem)
            .to_owned(),
          schedule_expression: header
            .get("schedule")
            .unwrap_or(&opts.default_schedule)
            .to_owned(),
          description:         header
            .get("description")
            .map(str::to_owned)
            .unwrap_or_else(|| description.replace('_', " ")),
        };
        (Some(meta), header.body_offset)
      }
      None => (None, 0),
    };

    Ok(Self {
      version,
      description,
      script_name,
      path,
      raw_content,
      scheduled,
      body_offset,
    })
  }

  pub fn is_scheduled(&self) -> bool { self.scheduled.is_some() }

  /// The full script with placeholders replaced.
  pub fn substituted(&self, target: &Target) -> String {
    substitute(&self.raw_content, target)
  }

  /// Checksum of [`Self::substituted`]; what the ledger records.
  pub fn checksum(&self, target: &Target) -> ChecksumDigest {
    ChecksumDigest::of(&self.substituted(target))
  }

  /// The substituted script with the directive header removed. For direct
  /// scripts this is the whole substituted content.
  pub fn body(&self, target: &Target) -> String {
    substitute(&self.raw_content[self.body_offset..], target)
      .trim()
      .to_owned()
  }

  /// Scheduled metadata with placeholders replaced in every field.
  pub fn scheduled_metadata(&self, target: &Target) -> Option<ScheduledMetadata> {
    self.scheduled.as_ref().map(|m| ScheduledMetadata {
      display_name:        substitute(&m.display_name, target),
      schedule_expression: substitute(&m.schedule_expression, target),
      description:         substitute(&m.description, target),
    })
  }
}

// ─── Ordering ────────────────────────────────────────────────────────────────

/// Sort ascending by numeric version and reject duplicate versions.
pub fn order_by_version(mut files: Vec<MigrationFile>) -> Result<Vec<MigrationFile>> {
  files.sort_by(|a, b| {
    a.version
      .cmp(&b.version)
      .then_with(|| a.script_name.cmp(&b.script_name))
  });

  if let Some(pair) = files.windows(2).find(|w| w[0].version == w[1].version) {
    return Err(Error::DuplicateVersion {
      version: pair[0].version,
      first:   pair[0].script_name.clone(),
      second:  pair[1].script_name.clone(),
    });
  }

  Ok(files)
}
