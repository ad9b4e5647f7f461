//! Canonical weekly sampling calendar.
//!
//! NTN samples are collected on Tuesdays, so the default anchor is
//! [`Weekday::Tue`]. The calendar runs from the first anchor weekday of the
//! start month to the first anchor weekday of the end month, stepping exactly
//! seven days. July..August 1978 therefore ends on 1978-08-01.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use thiserror::Error;

pub const DEFAULT_ANCHOR_WEEKDAY: Weekday = Weekday::Tue;

/// Roughly two hundred years of weekly anchors.
pub const DEFAULT_MAX_CALENDAR_LEN: usize = 10_436;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("invalid month {month} of year {year}")]
    InvalidMonth { month: u32, year: i32 },
    #[error("invalid calendar range: {0}")]
    InvalidRange(String),
    #[error("calendar would hold {anchors} anchors, limit is {limit}")]
    TooLarge { anchors: usize, limit: usize },
}

/// Every date of `month`/`year` falling on `weekday`.
pub fn anchors_in_month(
    month: u32,
    year: i32,
    weekday: Weekday,
) -> Result<Vec<NaiveDate>, CalendarError> {
    let first = first_of_month(month, year)?;
    let mut day = first_weekday_on_or_after(first, weekday)?;
    let mut out = Vec::with_capacity(5);
    while day.month() == month {
        out.push(day);
        day = match day.checked_add_days(Days::new(7)) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(out)
}

pub fn generate_calendar(
    start_month: u32,
    start_year: i32,
    end_month: u32,
    end_year: i32,
    anchor_weekday: Weekday,
) -> Result<Vec<NaiveDate>, CalendarError> {
    generate_calendar_bounded(
        start_month,
        start_year,
        end_month,
        end_year,
        anchor_weekday,
        DEFAULT_MAX_CALENDAR_LEN,
    )
}

pub fn generate_calendar_bounded(
    start_month: u32,
    start_year: i32,
    end_month: u32,
    end_year: i32,
    anchor_weekday: Weekday,
    max_len: usize,
) -> Result<Vec<NaiveDate>, CalendarError> {
    let start = first_of_month(start_month, start_year)?;
    let end = first_of_month(end_month, end_year)?;
    if end < start {
        return Err(CalendarError::InvalidRange(format!(
            "end {end_year}-{end_month:02} precedes start {start_year}-{start_month:02}"
        )));
    }

    let first = anchors_in_month(start_month, start_year, anchor_weekday)?
        .first()
        .copied()
        .ok_or(CalendarError::InvalidMonth {
            month: start_month,
            year: start_year,
        })?;
    let last = anchors_in_month(end_month, end_year, anchor_weekday)?
        .first()
        .copied()
        .ok_or(CalendarError::InvalidMonth {
            month: end_month,
            year: end_year,
        })?;

    let anchors = ((last - first).num_days() / 7 + 1) as usize;
    if anchors > max_len {
        return Err(CalendarError::TooLarge {
            anchors,
            limit: max_len,
        });
    }

    let mut out = Vec::with_capacity(anchors);
    let mut day = first;
    while day <= last {
        out.push(day);
        day = match day.checked_add_days(Days::new(7)) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(out)
}

fn first_of_month(month: u32, year: i32) -> Result<NaiveDate, CalendarError> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(CalendarError::InvalidMonth { month, year })
}

fn first_weekday_on_or_after(date: NaiveDate, weekday: Weekday) -> Result<NaiveDate, CalendarError> {
    let offset = (7 + weekday.num_days_from_monday() - date.weekday().num_days_from_monday()) % 7;
    date.checked_add_days(Days::new(u64::from(offset)))
        .ok_or(CalendarError::InvalidMonth {
            month: date.month(),
            year: date.year(),
        })
}
