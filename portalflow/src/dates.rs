use crate::AutomationError;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive range of calendar days used for searches, reports and backups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AutomationError> {
        if start > end {
            return Err(AutomationError::InvalidArgument(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// First to last day of a month.
    pub fn month(year: i32, month: u32) -> Result<Self, AutomationError> {
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            AutomationError::InvalidArgument(format!("invalid month {year}-{month:02}"))
        })?;
        let next_month_start = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| AutomationError::InvalidArgument(format!("month out of range: {year}")))?;
        let end = next_month_start
            .pred_opt()
            .ok_or_else(|| AutomationError::Internal("date underflow".to_string()))?;
        Ok(Self { start, end })
    }

    /// First of the month up to and including `today`.
    pub fn month_to_date(today: NaiveDate) -> Self {
        Self {
            start: today.with_day(1).unwrap_or(today),
            end: today,
        }
    }

    /// Parse `YYYY-MM` into the full month.
    pub fn parse_month(value: &str) -> Result<Self, AutomationError> {
        let (year, month) = value.trim().split_once('-').ok_or_else(|| {
            AutomationError::InvalidArgument(format!("expected YYYY-MM, got '{value}'"))
        })?;
        let year: i32 = year.parse().map_err(|_| {
            AutomationError::InvalidArgument(format!("invalid year in '{value}'"))
        })?;
        let month: u32 = month.parse().map_err(|_| {
            AutomationError::InvalidArgument(format!("invalid month in '{value}'"))
        })?;
        Self::month(year, month)
    }

    /// Parse a pair of `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, AutomationError> {
        Self::new(parse_day(start)?, parse_day(end)?)
    }

    /// Build a range from optional bounds, defaulting to month-to-date around `today`.
    pub fn from_bounds(
        start: Option<&str>,
        end: Option<&str>,
        today: NaiveDate,
    ) -> Result<Self, AutomationError> {
        let default = Self::month_to_date(today);
        let start = start.map(parse_day).transpose()?.unwrap_or(default.start);
        let end = end.map(parse_day).transpose()?.unwrap_or(default.end);
        Self::new(start, end)
    }

    /// The portal's input format for both bounds (`YYYYMMDD`).
    pub fn compact(&self) -> (String, String) {
        (
            self.start.format("%Y%m%d").to_string(),
            self.end.format("%Y%m%d").to_string(),
        )
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ~ {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

fn parse_day(value: &str) -> Result<NaiveDate, AutomationError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        AutomationError::InvalidArgument(format!("invalid date '{value}' (expected YYYY-MM-DD): {e}"))
    })
}
