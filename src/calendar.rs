//! Calendar month arithmetic

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

/// A calendar month, stored as its first day
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth(NaiveDate);

impl YearMonth {
    /// Create from year and month (1-12); years are limited to 1..=9999
    pub fn new(year: i32, month: u32) -> Result<Self, ValueError> {
        if !(1..=9999).contains(&year) {
            return Err(ValueError::InvalidMonth {
                input: format!("{}-{:02}", year, month),
            });
        }
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(YearMonth)
            .ok_or_else(|| ValueError::InvalidMonth {
                input: format!("{}-{:02}", year, month),
            })
    }

    /// The month containing `date`
    pub fn from_date(date: NaiveDate) -> Self {
        YearMonth(NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date))
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Month of year (1-12)
    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    pub fn last_day(&self) -> NaiveDate {
        self.0
            .checked_add_days(Days::new(u64::from(self.days_in_month()) - 1))
            .unwrap_or(self.0)
    }

    pub fn days_in_month(&self) -> u32 {
        match self.month() {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            _ => {
                if NaiveDate::from_ymd_opt(self.year(), 2, 29).is_some() {
                    29
                } else {
                    28
                }
            }
        }
    }

    /// The month `months` later, if representable
    pub fn checked_add_months(&self, months: u32) -> Option<YearMonth> {
        self.0
            .checked_add_months(Months::new(months))
            .filter(|d| d.year() <= 9999)
            .map(YearMonth)
    }

    /// Signed number of months from `earlier` to `self`
    pub fn months_since(&self, earlier: YearMonth) -> i64 {
        let this = i64::from(self.year()) * 12 + i64::from(self.month());
        let that = i64::from(earlier.year()) * 12 + i64::from(earlier.month());
        this - that
    }
}

impl FromStr for YearMonth {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValueError::InvalidMonth {
            input: s.to_string(),
        };
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        YearMonth::new(year, month).map_err(|_| invalid())
    }
}

impl TryFrom<String> for YearMonth {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl fmt::Debug for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "YearMonth({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(ym("2025-03").to_string(), "2025-03");
        assert_eq!(ym("2025-03").year(), 2025);
        assert_eq!(ym("2025-03").month(), 3);
        assert!("2025-13".parse::<YearMonth>().is_err());
        assert!("2025-3".parse::<YearMonth>().is_err());
        assert!("March".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_add_months_rolls_over_year() {
        assert_eq!(ym("2025-11").checked_add_months(3), Some(ym("2026-02")));
        assert_eq!(ym("2025-01").checked_add_months(0), Some(ym("2025-01")));
        assert_eq!(ym("9999-12").checked_add_months(1), None);
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(ym("2024-02").days_in_month(), 29);
        assert_eq!(ym("2025-02").days_in_month(), 28);
        assert_eq!(ym("1900-02").days_in_month(), 28);
        assert_eq!(ym("2025-04").days_in_month(), 30);
        assert_eq!(ym("2025-04").last_day(), NaiveDate::from_ymd_opt(2025, 4, 30).unwrap());
    }

    #[test]
    fn test_months_since() {
        assert_eq!(ym("2026-02").months_since(ym("2025-11")), 3);
        assert_eq!(ym("2025-11").months_since(ym("2026-02")), -3);
    }

    #[test]
    fn test_from_date() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 19).unwrap();
        assert_eq!(YearMonth::from_date(date), ym("2025-07"));
    }

    #[test]
    fn test_serde_round_trip_as_string() {
        let json = serde_json::to_string(&ym("2030-09")).unwrap();
        assert_eq!(json, "\"2030-09\"");
        assert!(serde_json::from_str::<YearMonth>("\"2030-9\"").is_err());
    }
}
