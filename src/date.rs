//! Calendar helpers: the `YearMonth` period token of monthly dumps and the
//! derived `created_date` text computed from epoch seconds.

use std::fmt;
use std::str::FromStr;
use time::macros::format_description;
use time::OffsetDateTime;

/// "YYYY-MM" period of a monthly dump file, ordered chronologically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: u16,
    pub month: u8, // 1..=12
}

impl YearMonth {
    pub fn new(year: u16, month: u8) -> Self {
        assert!((1..=12).contains(&month), "Month must be 1..=12");
        Self { year, month }
    }

    /// True when `self` falls within the inclusive `[start, end]` window; open ends match anything.
    pub fn within(self, start: Option<YearMonth>, end: Option<YearMonth>) -> bool {
        start.map_or(true, |s| self >= s) && end.map_or(true, |e| self <= e)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s.split_once('-').ok_or("expected YYYY-MM")?;
        if y.len() != 4 || m.len() != 2 {
            return Err("expected YYYY-MM".into());
        }
        let year: u16 = y.parse().map_err(|_| "invalid year")?;
        let month: u8 = m.parse().map_err(|_| "invalid month")?;
        if !(1..=12).contains(&month) {
            return Err("month must be 01..12".into());
        }
        Ok(Self { year, month })
    }
}

/// Parse an epoch-seconds cell as stored in a flat row.
///
/// Dumps carry `created_utc` as an integer, a float (`1136073600.0`) or a
/// quoted string of either; fractional seconds are floored.
pub fn parse_epoch_seconds(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    let f: f64 = raw.parse().ok()?;
    if !f.is_finite() || f < i64::MIN as f64 || f > i64::MAX as f64 {
        return None;
    }
    Some(f.floor() as i64)
}

/// Render epoch seconds as `YYYY-MM-DD-HHMMSS` in UTC. `None` when out of range.
pub fn format_created_date(epoch: i64) -> Option<String> {
    let fmt = format_description!("[year]-[month]-[day]-[hour][minute][second]");
    let dt = OffsetDateTime::from_unix_timestamp(epoch).ok()?;
    dt.format(fmt).ok()
}
