//! Monthly expense report types.
//!
//! A report covers the half-open interval `[first day of month, first day of
//! next month)` and sums expense amounts per `(dimension, currency)` pair.
//! Amounts in different currencies are never added together.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// ISO date format used for stored dates and interval bounds.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    #[error("month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),
    #[error("year must be between 1 and 9999, got {0}")]
    InvalidYear(i32),
}

/// The `[start, end)` date interval covered by one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MonthRange {
    pub fn new(year: i32, month: u32) -> Result<Self, ReportError> {
        if !(1..=12).contains(&month) {
            return Err(ReportError::InvalidMonth(month));
        }
        if !(1..=9999).contains(&year) {
            return Err(ReportError::InvalidYear(year));
        }

        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        // Bounds are compared as four-digit ISO strings.
        if next_year > 9999 {
            return Err(ReportError::InvalidYear(year));
        }

        let start =
            NaiveDate::from_ymd_opt(year, month, 1).ok_or(ReportError::InvalidYear(year))?;
        let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .ok_or(ReportError::InvalidYear(next_year))?;

        Ok(Self { start, end })
    }

    pub fn year(&self) -> i32 {
        self.start.year()
    }

    pub fn month(&self) -> u32 {
        self.start.month()
    }

    /// Inclusive lower bound, as stored in the `date` column.
    pub fn start_key(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    /// Exclusive upper bound, as stored in the `date` column.
    pub fn end_key(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub currency: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserTotal {
    pub user: String,
    pub currency: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateTotal {
    pub date: String,
    pub currency: String,
    pub total: f64,
}

/// Expense sums for one month, grouped three ways.
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyReport {
    pub year: i32,
    pub month: u32,
    pub start: String,
    pub end: String,
    pub by_category: Vec<CategoryTotal>,
    pub by_user: Vec<UserTotal>,
    pub by_date: Vec<DateTotal>,
}
