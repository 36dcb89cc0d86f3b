//! Inclusive day ranges used by the admin listings

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

/// An inclusive range of calendar days (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Parse `YYYY-MM-DD a YYYY-MM-DD`
    pub fn parse(value: &str) -> Option<Self> {
        Self::parse_with(value, &[" a "], false)
    }

    /// Parse a range split by ` - `, ` to ` or ` a `, or a single day
    pub fn parse_lenient(value: &str) -> Option<Self> {
        Self::parse_with(value, &[" - ", " to ", " a "], true)
    }

    fn parse_with(value: &str, separators: &[&str], allow_single: bool) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        let (start, end) = match separators.iter().find_map(|sep| value.split_once(sep)) {
            Some((start, end)) => (start.trim(), end.trim()),
            None if allow_single => (value, value),
            None => return None,
        };

        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d").ok()?;
        let end = NaiveDate::parse_from_str(end, "%Y-%m-%d").ok()?;
        Some(Self { start, end })
    }

    /// First instant of the range
    pub fn start_time(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.start.and_time(chrono::NaiveTime::MIN))
    }

    /// First instant after the range (exclusive upper bound)
    pub fn end_time_exclusive(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&(self.end + Duration::days(1)).and_time(chrono::NaiveTime::MIN))
    }
}

/// Treat an "all" sentinel (`todas`/`todos`) or a blank value as no filter
pub fn unless_all(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("todas") || value.eq_ignore_ascii_case("todos") {
        None
    } else {
        Some(value.to_string())
    }
}
