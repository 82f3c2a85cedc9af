use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};

use crate::error::DataMallError;

/// A calendar month, rendered as `YYYYMM` in file names and `Date` query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReportPeriod {
    year: i32,
    month: u32,
}

impl ReportPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, DataMallError> {
        if !(1..=12).contains(&month) || !(0..=9999).contains(&year) {
            return Err(DataMallError::InvalidPeriod(format!("{year:04}{month:02}")));
        }
        Ok(Self { year, month })
    }

    /// The month containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The calendar month before the one containing `date`.
    pub fn previous_month(date: NaiveDate) -> Self {
        let first = date.with_day(1).unwrap_or(date);
        let previous = first.checked_sub_months(Months::new(1)).unwrap_or(first);
        Self::containing(previous)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn stamp(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

impl FromStr for ReportPeriod {
    type Err = DataMallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() != 6 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DataMallError::InvalidPeriod(s.to_string()));
        }
        let year = trimmed[..4]
            .parse::<i32>()
            .map_err(|_| DataMallError::InvalidPeriod(s.to_string()))?;
        let month = trimmed[4..]
            .parse::<u32>()
            .map_err(|_| DataMallError::InvalidPeriod(s.to_string()))?;
        Self::new(year, month).map_err(|_| DataMallError::InvalidPeriod(s.to_string()))
    }
}
