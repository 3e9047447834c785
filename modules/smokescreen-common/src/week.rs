//! Week partitions. A week starts on Sunday 00:00 UTC and runs seven days.
//!
//! The current week is always derived from a timestamp, never stored.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Identifies a week partition by the date of its Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekId(NaiveDate);

impl WeekId {
    /// The week containing `ts`.
    pub fn containing(ts: DateTime<Utc>) -> Self {
        let date = ts.date_naive();
        let offset = date.weekday().num_days_from_sunday() as i64;
        Self(date - Duration::days(offset))
    }

    /// The week containing the current instant.
    pub fn current() -> Self {
        Self::containing(Utc::now())
    }

    /// Build from any date inside the week.
    pub fn from_date(date: NaiveDate) -> Self {
        let offset = date.weekday().num_days_from_sunday() as i64;
        Self(date - Duration::days(offset))
    }

    pub fn sunday(&self) -> NaiveDate {
        self.0
    }

    pub fn start(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.0.and_time(NaiveTime::default()))
    }

    /// Exclusive end of the week.
    pub fn end(&self) -> DateTime<Utc> {
        self.start() + Duration::days(7)
    }

    pub fn previous(&self) -> Self {
        Self(self.0 - Duration::days(7))
    }

    pub fn next(&self) -> Self {
        Self(self.0 + Duration::days(7))
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start() && ts < self.end()
    }

    /// Whether the week is over as of `now`.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end()
    }
}

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for WeekId {
    type Err = chrono::ParseError;

    /// Accepts any date inside the week, normalizing to its Sunday.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?;
        Ok(Self::from_date(date))
    }
}

impl From<WeekId> for NaiveDate {
    fn from(week: WeekId) -> Self {
        week.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn week_starts_on_sunday() {
        // 2026-10-16 is a Friday
        let week = WeekId::containing(at(2026, 10, 16, 12));
        assert_eq!(week.to_string(), "2026-10-11");
        assert_eq!(week.sunday().weekday(), chrono::Weekday::Sun);
    }

    #[test]
    fn sunday_belongs_to_its_own_week() {
        let week = WeekId::containing(at(2026, 10, 11, 0));
        assert_eq!(week.to_string(), "2026-10-11");
    }

    #[test]
    fn saturday_night_is_still_previous_week() {
        let week = WeekId::containing(at(2026, 10, 17, 23));
        assert_eq!(week.to_string(), "2026-10-11");
        assert!(week.contains(at(2026, 10, 17, 23)));
        assert!(!week.contains(at(2026, 10, 18, 0)));
    }

    #[test]
    fn parse_normalizes_to_sunday() {
        let week: WeekId = "2026-10-14".parse().unwrap();
        assert_eq!(week.to_string(), "2026-10-11");
    }

    #[test]
    fn has_ended_at_exclusive_end() {
        let week: WeekId = "2026-10-11".parse().unwrap();
        assert!(!week.has_ended(at(2026, 10, 17, 23)));
        assert!(week.has_ended(at(2026, 10, 18, 0)));
        assert_eq!(week.next().previous(), week);
    }
}
