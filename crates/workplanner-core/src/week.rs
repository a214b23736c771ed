//! Week keys (`YYYY-WW`) identifying a planning week.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::{PlannerError, Result};

static WEEK_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^(\d{4})-(\d{2})$").expect("static regex"));

/// A calendar week for scheduling purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeekKey {
    pub year: i32,
    pub week_number: u32,
}

impl WeekKey {
    /// Highest number the counting rule yields: Dec 31 of a year whose
    /// Jan 1 falls on a Saturday lands in week 54.
    pub const MAX_WEEK: u32 = 54;

    pub fn new(year: i32, week_number: u32) -> Result<Self> {
        if !(1..=Self::MAX_WEEK).contains(&week_number) {
            return Err(PlannerError::invalid(
                "week",
                format!("Week number must be between 1 and {}", Self::MAX_WEEK),
            ));
        }
        Ok(Self { year, week_number })
    }

    /// Parse `YYYY-WW`.
    pub fn parse(s: &str) -> Result<Self> {
        let caps = WEEK_PATTERN
            .captures(s.trim())
            .ok_or_else(|| PlannerError::invalid("week", "Week must be in format YYYY-WW"))?;
        let year: i32 = caps[1]
            .parse()
            .map_err(|_| PlannerError::invalid("week", "Invalid year"))?;
        let week_number: u32 = caps[2]
            .parse()
            .map_err(|_| PlannerError::invalid("week", "Invalid week number"))?;
        Self::new(year, week_number)
    }

    /// Week containing `at`, counted as
    /// `ceil((days since Jan 1 + weekday of Jan 1 (Sunday = 0) + 1) / 7)`.
    pub fn containing(at: DateTime<Utc>) -> Self {
        let year = at.year();
        let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        let elapsed_days =
            (at.naive_utc() - jan1).num_milliseconds() as f64 / 86_400_000.0;
        let jan1_weekday = f64::from(jan1.weekday().num_days_from_sunday());
        let week = ((elapsed_days + jan1_weekday + 1.0) / 7.0).ceil().max(1.0) as u32;
        Self {
            year,
            week_number: week,
        }
    }

    /// The week before this one, crossing into the last week of the
    /// previous year when needed.
    pub fn previous(&self) -> Self {
        if self.week_number > 1 {
            return Self {
                year: self.year,
                week_number: self.week_number - 1,
            };
        }
        match NaiveDate::from_ymd_opt(self.year - 1, 12, 31).and_then(|d| d.and_hms_opt(23, 59, 59)) {
            Some(last) => Self::containing(last.and_utc()),
            None => Self {
                year: self.year - 1,
                week_number: Self::MAX_WEEK - 1,
            },
        }
    }

    pub fn current() -> Self {
        Self::containing(Utc::now())
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.week_number)
    }
}

impl FromStr for WeekKey {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WeekKey {
    type Error = PlannerError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<WeekKey> for String {
    fn from(w: WeekKey) -> Self {
        w.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_and_display() {
        let week = WeekKey::parse("2024-49").unwrap();
        assert_eq!(week.year, 2024);
        assert_eq!(week.week_number, 49);
        assert_eq!(week.to_string(), "2024-49");

        let early = WeekKey::new(2025, 3).unwrap();
        assert_eq!(early.to_string(), "2025-03");
    }

    #[test]
    fn test_parse_rejects_bad_formats() {
        for bad in ["2024-4", "24-49", "2024/49", "2024-494", "", "2024-00", "2024-55"] {
            let err = WeekKey::parse(bad).unwrap_err();
            assert!(matches!(err, PlannerError::Validation(_)), "{bad} should fail");
        }
    }

    #[test]
    fn test_containing_matches_counting_rule() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(WeekKey::containing(start).to_string(), "2024-01");

        let december = Utc.with_ymd_and_hms(2024, 12, 4, 12, 0, 0).unwrap();
        assert_eq!(WeekKey::containing(december).to_string(), "2024-49");
    }

    #[test]
    fn test_saturday_start_year_reaches_week_54() {
        let eve = Utc.with_ymd_and_hms(2022, 12, 31, 12, 0, 0).unwrap();
        let week = WeekKey::containing(eve);
        assert_eq!(week.to_string(), "2022-54");
        assert_eq!(WeekKey::parse("2022-54").unwrap(), week);

        let christmas = Utc.with_ymd_and_hms(2022, 12, 25, 12, 0, 0).unwrap();
        assert_eq!(WeekKey::containing(christmas).to_string(), "2022-53");
    }

    #[test]
    fn test_previous_crosses_year_boundary() {
        let week = WeekKey::parse("2024-49").unwrap();
        assert_eq!(week.previous().to_string(), "2024-48");
        assert_eq!(WeekKey::parse("2023-01").unwrap().previous().to_string(), "2022-54");
        assert_eq!(WeekKey::parse("2024-01").unwrap().previous().to_string(), "2023-53");
    }

    #[test]
    fn test_serde_as_string() {
        let week: WeekKey = serde_json::from_str("\"2024-07\"").unwrap();
        assert_eq!(week.week_number, 7);
        assert_eq!(serde_json::to_string(&week).unwrap(), "\"2024-07\"");
        assert!(serde_json::from_str::<WeekKey>("\"2024-7\"").is_err());
    }
}
