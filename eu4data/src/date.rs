//! Calendar dates as they appear in history files (`1444.11.11`).

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::history::HistoryError;

/// Block keys only count as dated deltas when they match this exactly.
static DATE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}\.[0-9]{1,2}\.[0-9]{1,2}$").expect("valid regex"));

/// Query strings may use a shorter year.
static DATE_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{1,4})\.([0-9]{1,2})\.([0-9]{1,2})$").expect("valid regex")
});

/// A specific date in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    pub year: i32,
    pub month: u8, // 1-12
    pub day: u8,   // 1-31
}

impl Date {
    /// Sorts before every real date; the base state of an entity lives here.
    pub const BEGINNING: Date = Date {
        year: 1,
        month: 1,
        day: 1,
    };

    /// The usual starting date of a game.
    pub const GAME_START: Date = Date {
        year: 1444,
        month: 11,
        day: 11,
    };

    pub fn new(year: i32, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }

    /// Builds a date, checking it exists in the Gregorian calendar.
    pub fn checked(year: i32, month: u8, day: u8) -> Option<Self> {
        if year < 1 || !(1..=12).contains(&month) {
            return None;
        }
        if day < 1 || day > days_in_month(year, month) {
            return None;
        }
        Some(Self { year, month, day })
    }

    /// Returns true if `key` has the shape of a dated delta key.
    pub fn is_date_key(key: &str) -> bool {
        DATE_KEY.is_match(key)
    }

    /// Parses a block key of the form `YYYY.M.D`.
    ///
    /// Returns `Ok(None)` for keys that are not date shaped at all and an
    /// error for keys that are date shaped but name an impossible day.
    pub fn from_key(key: &str) -> Result<Option<Self>, HistoryError> {
        if !Self::is_date_key(key) {
            return Ok(None);
        }
        key.parse().map(Some)
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i32, month: u8) -> u8 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

impl Default for Date {
    fn default() -> Self {
        Self::GAME_START
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.year, self.month, self.day)
    }
}

impl FromStr for Date {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HistoryError::DateFormat {
            input: s.to_string(),
        };
        let caps = DATE_QUERY.captures(s.trim()).ok_or_else(invalid)?;
        let year = caps[1].parse().map_err(|_| invalid())?;
        let month = caps[2].parse().map_err(|_| invalid())?;
        let day = caps[3].parse().map_err(|_| invalid())?;
        Date::checked(year, month, day).ok_or_else(invalid)
    }
}

impl Serialize for Date {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Date {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The point in time a snapshot is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotDate {
    /// The entity's default observation date.
    Start,
    /// An explicit calendar date.
    On(Date),
}

impl SnapshotDate {
    /// The empty string selects [`SnapshotDate::Start`].
    pub fn parse(s: &str) -> Result<Self, HistoryError> {
        if s.trim().is_empty() {
            Ok(SnapshotDate::Start)
        } else {
            s.parse().map(SnapshotDate::On)
        }
    }

    pub fn resolve(self, default_date: Date) -> Date {
        match self {
            SnapshotDate::Start => default_date,
            SnapshotDate::On(date) => date,
        }
    }
}

impl From<Date> for SnapshotDate {
    fn from(date: Date) -> Self {
        SnapshotDate::On(date)
    }
}

impl FromStr for SnapshotDate {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SnapshotDate::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let date: Date = "1444.11.11".parse().unwrap();
        assert_eq!(date, Date::new(1444, 11, 11));
        assert_eq!(date.to_string(), "1444.11.11");

        let date: Date = "1500.1.01".parse().unwrap();
        assert_eq!(date, Date::new(1500, 1, 1));
    }

    #[test]
    fn test_short_year_in_queries() {
        assert_eq!("1.1.1".parse::<Date>().unwrap(), Date::BEGINNING);
        assert_eq!("980.3.4".parse::<Date>().unwrap(), Date::new(980, 3, 4));
    }

    #[test]
    fn test_invalid_dates() {
        for bad in ["", "1444", "1444.13.1", "1444.2.30", "1444.11.11.1", "abc", "1444-11-11", "0.1.1"] {
            assert!(
                matches!(bad.parse::<Date>(), Err(HistoryError::DateFormat { .. })),
                "{} should not parse",
                bad
            );
        }
    }

    #[test]
    fn test_leap_years() {
        assert!(Date::checked(1600, 2, 29).is_some());
        assert!(Date::checked(1700, 2, 29).is_none());
        assert!(Date::checked(1444, 2, 29).is_some());
        assert!(Date::checked(1445, 2, 29).is_none());
    }

    #[test]
    fn test_date_keys() {
        assert!(Date::is_date_key("1444.11.11"));
        assert!(Date::is_date_key("1500.1.1"));
        assert!(!Date::is_date_key("980.1.1"));
        assert!(!Date::is_date_key("owner"));
        assert!(!Date::is_date_key("1444.111.1"));

        assert_eq!(Date::from_key("owner").unwrap(), None);
        assert_eq!(
            Date::from_key("1521.1.1").unwrap(),
            Some(Date::new(1521, 1, 1))
        );
        assert!(Date::from_key("1521.2.31").is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(Date::BEGINNING < Date::new(1399, 10, 14));
        assert!(Date::new(1444, 11, 11) < Date::new(1444, 11, 12));
        assert!(Date::new(1444, 12, 1) > Date::new(1444, 11, 30));
    }

    #[test]
    fn test_snapshot_date() {
        assert_eq!(SnapshotDate::parse("").unwrap(), SnapshotDate::Start);
        assert_eq!(
            SnapshotDate::parse("1600.1.1").unwrap(),
            SnapshotDate::On(Date::new(1600, 1, 1))
        );
        assert!(SnapshotDate::parse("yesterday").is_err());
        assert_eq!(
            SnapshotDate::Start.resolve(Date::GAME_START),
            Date::GAME_START
        );
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Date::new(1444, 11, 11)).unwrap();
        assert_eq!(json, "\"1444.11.11\"");
        let back: Date = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Date::GAME_START);
        assert!(serde_json::from_str::<Date>("\"1444.2.30\"").is_err());
    }
}
