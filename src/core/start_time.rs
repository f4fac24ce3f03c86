//! Start-time derivation from OS-reported elapsed running time.
//!
//! The OS only tells us how long a process has been running, in the `ps`
//! `etime` formats `D-HH:MM:SS`, `HH:MM:SS` or `MM:SS`. Subtracting that from
//! the wall clock gives an approximate start timestamp, accurate to the second.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::table::ProcessTable;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

/// How long a process has been running, to the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ElapsedTime {
    secs: u64,
}

impl ElapsedTime {
    pub fn from_secs(secs: u64) -> Self {
        Self { secs }
    }

    pub fn as_secs(&self) -> u64 {
        self.secs
    }

    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.secs)
    }

    /// The instant this much time before `now`, `None` if it isn't representable.
    pub fn started_before(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        let elapsed = chrono::Duration::from_std(self.as_duration()).ok()?;
        now.checked_sub_signed(elapsed)
    }

    /// Days, hours, minutes and seconds, as `ps` splits them.
    fn components(&self) -> (u64, u64, u64, u64) {
        (
            self.secs / SECS_PER_DAY,
            (self.secs % SECS_PER_DAY) / SECS_PER_HOUR,
            (self.secs % SECS_PER_HOUR) / SECS_PER_MINUTE,
            self.secs % SECS_PER_MINUTE,
        )
    }
}

fn parse_field(field: &str, what: &str, limit: Option<u64>) -> Result<u64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        bail!("Invalid {} field: {:?}", what, field);
    }
    let value: u64 = field
        .parse()
        .with_context(|| format!("Invalid {} field: {:?}", what, field))?;
    if let Some(limit) = limit {
        if value >= limit {
            bail!("{} out of range: {}", what, value);
        }
    }
    Ok(value)
}

impl FromStr for ElapsedTime {
    type Err = anyhow::Error;

    /// Parses `D-HH:MM:SS`, `HH:MM:SS` or `MM:SS`. Every component counts,
    /// including days and hours.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();

        let (days, clock) = match s.split_once('-') {
            Some((days, clock)) => (parse_field(days, "days", None)?, clock),
            None => (0, s),
        };

        let fields: Vec<&str> = clock.split(':').collect();
        let (hours, minutes, seconds) = match fields.as_slice() {
            [h, m, sec] => (
                parse_field(h, "hours", if days > 0 { Some(24) } else { None })?,
                parse_field(m, "minutes", Some(60))?,
                parse_field(sec, "seconds", Some(60))?,
            ),
            // `ps` never drops the hour field once a day component is present
            [m, sec] if days == 0 && !s.contains('-') => (
                0,
                parse_field(m, "minutes", None)?,
                parse_field(sec, "seconds", Some(60))?,
            ),
            _ => return Err(anyhow!("Unrecognised elapsed time format: {:?}", s)),
        };

        let secs = days
            .checked_mul(SECS_PER_DAY)
            .and_then(|d| d.checked_add(hours.checked_mul(SECS_PER_HOUR)?))
            .and_then(|t| t.checked_add(minutes.checked_mul(SECS_PER_MINUTE)?))
            .and_then(|t| t.checked_add(seconds))
            .ok_or_else(|| anyhow!("Elapsed time overflows: {:?}", s))?;

        Ok(Self { secs })
    }
}

impl fmt::Display for ElapsedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (days, hours, minutes, seconds) = self.components();
        if days > 0 {
            write!(f, "{}-{:02}:{:02}:{:02}", days, hours, minutes, seconds)
        } else if hours > 0 {
            write!(f, "{:02}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            write!(f, "{:02}:{:02}", minutes, seconds)
        }
    }
}

/// Approximate start time of `pid`, or `None` if it is gone or its
/// accounting data can't be read.
pub fn start_time<T: ProcessTable + ?Sized>(table: &T, pid: i32) -> Option<DateTime<Local>> {
    start_time_at(table, pid, Local::now())
}

/// Same as [`start_time`], measured against a caller-supplied "now".
pub fn start_time_at<T: ProcessTable + ?Sized>(
    table: &T,
    pid: i32,
    now: DateTime<Local>,
) -> Option<DateTime<Local>> {
    table.elapsed(pid)?.started_before(now)
}
