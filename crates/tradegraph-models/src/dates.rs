//! Date handling shared by the driver and the data collaborators.
//!
//! Every operation accepts a [`DateInput`], so callers can pass a
//! `"YYYY-MM-DD"` string, a `NaiveDate` or a UTC timestamp interchangeably.

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc, Weekday};
use thiserror::Error;

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    #[error("Unable to parse date '{input}' with format '{format}'")]
    Parse { input: String, format: String },

    #[error("Start date {start} is after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Date step must be positive, got {0}")]
    InvalidStep(i64),

    #[error("Date arithmetic overflowed for {0}")]
    Overflow(NaiveDate),
}

/// Any of the date representations the system accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateInput {
    Text(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl From<&str> for DateInput {
    fn from(value: &str) -> Self {
        DateInput::Text(value.to_string())
    }
}

impl From<String> for DateInput {
    fn from(value: String) -> Self {
        DateInput::Text(value)
    }
}

impl From<&String> for DateInput {
    fn from(value: &String) -> Self {
        DateInput::Text(value.clone())
    }
}

impl From<NaiveDate> for DateInput {
    fn from(value: NaiveDate) -> Self {
        DateInput::Date(value)
    }
}

impl From<DateTime<Utc>> for DateInput {
    fn from(value: DateTime<Utc>) -> Self {
        DateInput::Timestamp(value)
    }
}

/// Parse a date string using a strftime-style format.
pub fn parse_date(input: &str, format: &str) -> Result<NaiveDate, DateError> {
    NaiveDate::parse_from_str(input.trim(), format).map_err(|_| DateError::Parse {
        input: input.to_string(),
        format: format.to_string(),
    })
}

pub fn format_date(date: NaiveDate, format: &str) -> String {
    date.format(format).to_string()
}

/// Normalise any accepted input to a calendar date. Timestamps are truncated to their UTC day.
pub fn ensure_date(input: impl Into<DateInput>, format: &str) -> Result<NaiveDate, DateError> {
    match input.into() {
        DateInput::Text(s) => parse_date(&s, format),
        DateInput::Date(d) => Ok(d),
        DateInput::Timestamp(ts) => Ok(ts.date_naive()),
    }
}

/// Validate and re-format any accepted input.
pub fn ensure_string(input: impl Into<DateInput>, format: &str) -> Result<String, DateError> {
    ensure_date(input, format).map(|d| format_date(d, format))
}

pub fn add_days(input: impl Into<DateInput>, days: i64) -> Result<NaiveDate, DateError> {
    let date = ensure_date(input, DEFAULT_DATE_FORMAT)?;
    TimeDelta::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or(DateError::Overflow(date))
}

pub fn subtract_days(input: impl Into<DateInput>, days: i64) -> Result<NaiveDate, DateError> {
    let input = input.into();
    match days.checked_neg() {
        Some(back) => add_days(input, back),
        None => Err(DateError::Overflow(ensure_date(input, DEFAULT_DATE_FORMAT)?)),
    }
}

/// Inclusive, ascending list of formatted dates from `start` to `end`.
pub fn date_range(
    start: impl Into<DateInput>,
    end: impl Into<DateInput>,
    step_days: i64,
) -> Result<Vec<String>, DateError> {
    if step_days <= 0 {
        return Err(DateError::InvalidStep(step_days));
    }

    let start = ensure_date(start, DEFAULT_DATE_FORMAT)?;
    let end = ensure_date(end, DEFAULT_DATE_FORMAT)?;
    if start > end {
        return Err(DateError::InvalidRange { start, end });
    }

    // a step too large to represent lands past any `end`
    let step = TimeDelta::try_days(step_days);
    let mut dates = Vec::new();
    let mut current = start;
    while current <= end {
        dates.push(format_date(current, DEFAULT_DATE_FORMAT));
        current = match step.and_then(|step| current.checked_add_signed(step)) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(dates)
}

pub fn is_business_day(input: impl Into<DateInput>) -> Result<bool, DateError> {
    let date = ensure_date(input, DEFAULT_DATE_FORMAT)?;
    Ok(!matches!(date.weekday(), Weekday::Sat | Weekday::Sun))
}

/// Move forward (or backward, for negative counts) by business days, skipping weekends.
pub fn add_business_days(
    input: impl Into<DateInput>,
    business_days: i64,
) -> Result<NaiveDate, DateError> {
    let mut current = ensure_date(input, DEFAULT_DATE_FORMAT)?;
    let direction = if business_days >= 0 { 1 } else { -1 };
    let mut remaining = business_days.abs();

    while remaining > 0 {
        current = current
            .checked_add_signed(TimeDelta::days(direction))
            .ok_or(DateError::Overflow(current))?;
        if is_business_day(current)? {
            remaining -= 1;
        }
    }
    Ok(current)
}

/// Weekdays between two dates, inclusive. Empty when `start` is after `end`.
pub fn trading_days_between(
    start: impl Into<DateInput>,
    end: impl Into<DateInput>,
) -> Result<Vec<String>, DateError> {
    let start = ensure_date(start, DEFAULT_DATE_FORMAT)?;
    let end = ensure_date(end, DEFAULT_DATE_FORMAT)?;

    Ok(start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .map(|d| format_date(d, DEFAULT_DATE_FORMAT))
        .collect())
}

/// Signed number of days from `first` to `second`.
pub fn days_between(
    first: impl Into<DateInput>,
    second: impl Into<DateInput>,
) -> Result<i64, DateError> {
    let first = ensure_date(first, DEFAULT_DATE_FORMAT)?;
    let second = ensure_date(second, DEFAULT_DATE_FORMAT)?;
    Ok((second - first).num_days())
}
