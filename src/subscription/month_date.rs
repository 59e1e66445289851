use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{LedgerError, Result};

// Shape only; month and year ranges are checked separately so callers can
// tell a bad month from a bad year.
static MONTH_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]{2})-([0-9]{4})$").expect("month date pattern compiles"));

/// Closed range of years accepted when parsing `MM-YYYY` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearBounds {
    pub min: u16,
    pub max: u16,
}

impl Default for YearBounds {
    fn default() -> Self {
        Self {
            min: 2000,
            max: 2100,
        }
    }
}

impl YearBounds {
    pub fn contains(&self, year: u16) -> bool {
        (self.min..=self.max).contains(&year)
    }
}

/// A calendar month with no day component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonthDate {
    month: u8,
    year: u16,
}

impl MonthDate {
    pub fn new(month: u8, year: u16) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(LedgerError::validation(
                "date_month",
                "month must be between 01 and 12",
            ));
        }
        if year > 9999 {
            return Err(LedgerError::validation(
                "date_year",
                "year must have four digits",
            ));
        }
        Ok(Self { month, year })
    }

    /// Parses `MM-YYYY` using the default year bounds.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_within(text, YearBounds::default())
    }

    pub fn parse_within(text: &str, bounds: YearBounds) -> Result<Self> {
        let format_err =
            || LedgerError::validation("date_format", "invalid format, expected MM-YYYY");
        let caps = MONTH_DATE_RE.captures(text).ok_or_else(format_err)?;
        let month: u8 = caps[1].parse().map_err(|_| format_err())?;
        let year: u16 = caps[2].parse().map_err(|_| format_err())?;

        if !(1..=12).contains(&month) {
            return Err(LedgerError::validation(
                "date_month",
                "month must be between 01 and 12",
            ));
        }
        if !bounds.contains(year) {
            return Err(LedgerError::validation(
                "date_year",
                format!("year must be between {} and {}", bounds.min, bounds.max),
            ));
        }
        Ok(Self { month, year })
    }

    /// Inverse of [`MonthDate::ordinal`].
    pub fn from_ordinal(ordinal: i64) -> Result<Self> {
        if ordinal < 1 {
            return Err(LedgerError::validation("date", "ordinal out of range"));
        }
        let month = ((ordinal - 1) % 12 + 1) as u8;
        let year = u16::try_from((ordinal - 1) / 12)
            .map_err(|_| LedgerError::validation("date_year", "year out of range"))?;
        Self::new(month, year)
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    /// `year * 12 + month`. Every comparison and every SQL translation goes
    /// through this value.
    pub fn ordinal(&self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month)
    }

    pub fn format(&self) -> String {
        self.to_string()
    }
}

impl Ord for MonthDate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}

impl PartialOrd for MonthDate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MonthDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:04}", self.month, self.year)
    }
}

impl FromStr for MonthDate {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for MonthDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MonthDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        MonthDate::parse(&raw).map_err(serde::de::Error::custom)
    }
}
