use chrono::{Datelike, Duration, Local, NaiveDate};
use thiserror::Error;

pub const WINDOW_DAYS: usize = 30;

const DISPLAY_FORMAT: &str = "%d.%m.";
const STORAGE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("expected a dd.mm. date, got '{0}'")]
    InvalidDisplay(String),
    #[error("expected a YYYY-MM-DD date, got '{0}'")]
    InvalidStorage(String),
}

pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn display(date: NaiveDate) -> String {
    date.format(DISPLAY_FORMAT).to_string()
}

pub fn storage(date: NaiveDate) -> String {
    date.format(STORAGE_FORMAT).to_string()
}

pub fn today() -> String {
    display(local_today())
}

pub fn last_30_days() -> Vec<String> {
    last_30_days_at(local_today()).into_iter().map(display).collect()
}

/// Trailing window ending at `today`, newest first.
pub fn last_30_days_at(today: NaiveDate) -> Vec<NaiveDate> {
    (0..WINDOW_DAYS as i64)
        .map(|offset| today - Duration::days(offset))
        .collect()
}

/// Inclusive `(from, to)` bounds of the window ending at `today`.
pub fn window_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (today - Duration::days(WINDOW_DAYS as i64 - 1), today)
}

pub fn to_storage_date(value: &str) -> Result<String, DateError> {
    to_storage_date_at(value, local_today())
}

/// Converts `dd.mm.` to `YYYY-MM-DD`.
///
/// The year is taken from the most recent occurrence of that day and month
/// on or before `reference`, so a window straddling New Year resolves its
/// December days to the previous year.
pub fn to_storage_date_at(value: &str, reference: NaiveDate) -> Result<String, DateError> {
    resolve_display_at(value, reference).map(storage)
}

pub fn resolve_display_at(value: &str, reference: NaiveDate) -> Result<NaiveDate, DateError> {
    let invalid = || DateError::InvalidDisplay(value.to_string());
    let (day, month) = value
        .strip_suffix('.')
        .and_then(|rest| rest.split_once('.'))
        .ok_or_else(invalid)?;
    let day: u32 = day.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;

    let year = if (month, day) > (reference.month(), reference.day()) {
        reference.year() - 1
    } else {
        reference.year()
    };

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

pub fn to_display_date(value: &str) -> Result<String, DateError> {
    NaiveDate::parse_from_str(value, STORAGE_FORMAT)
        .map(display)
        .map_err(|_| DateError::InvalidStorage(value.to_string()))
}
