//! Syntax check for custom schedule expressions, mirroring what the Data
//! Transfer service accepts:
//!
//! ```text
//! every 24 hours
//! every 15 minutes
//! every day 04:00
//! every monday,thursday 09:30
//! first sunday of quarter 00:00
//! 1st,3rd monday of month 09:00
//! ```

use crate::{Error, Result};

const UNITS: &[&str] = &["minute", "minutes", "mins", "hour", "hours"];

const DAYS: &[&str] = &[
  "day", "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday", "mon",
  "tue", "wed", "thu", "fri", "sat", "sun",
];

const ORDINALS: &[&str] = &[
  "first", "second", "third", "fourth", "last", "1st", "2nd", "3rd", "4th", "5th",
];

pub fn validate(expr: &str) -> Result<()> {
  let lower = expr.trim().to_ascii_lowercase();
  let words: Vec<&str> = lower.split_whitespace().collect();

  let ok = match words.as_slice() {
    ["every", n, unit, rest @ ..] if n.parse::<u32>().is_ok_and(|n| n > 0) => {
      UNITS.contains(unit) && interval_tail(rest)
    }
    ["every", days, rest @ ..] => list_of(days, DAYS) && optional_clock(rest),
    [ordinals, days, "of", _period, rest @ ..] => {
      list_of(ordinals, ORDINALS) && list_of(days, DAYS) && optional_clock(rest)
    }
    _ => false,
  };

  if ok { Ok(()) } else { Err(Error::InvalidSchedule(expr.to_owned())) }
}

fn list_of(word: &str, allowed: &[&str]) -> bool {
  word.split(',').all(|part| allowed.contains(&part))
}

fn optional_clock(rest: &[&str]) -> bool {
  match rest {
    [] => true,
    [clock] => is_clock(clock),
    _ => false,
  }
}

/// `[from HH:MM to HH:MM]`, or `synchronized`.
fn interval_tail(rest: &[&str]) -> bool {
  match rest {
    [] | ["synchronized"] => true,
    ["from", start, "to", end] => is_clock(start) && is_clock(end),
    _ => false,
  }
}

fn is_clock(s: &str) -> bool {
  let Some((h, m)) = s.split_once(':') else {
    return false;
  };
  h.len() == 2
    && m.len() == 2
    && h.parse::<u8>().is_ok_and(|h| h < 24)
    && m.parse::<u8>().is_ok_and(|m| m < 60)
}
