// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Recurring occurrence calculator.
//!
//! Weekday indices run from 0 (Monday) to 6 (Sunday). For every week offset in
//! the lookahead window and every weekday in the pattern exactly one date is
//! produced:
//!
//! ```text
//! days_until = (weekday - today.weekday) mod 7
//! date       = today + days_until + 7 * offset
//! ```
//!
//! so a weekday that falls on `today` starts with `today` itself, and a weekday
//! already past this week starts next week.

use std::collections::BTreeSet;

use chrono::{Datelike, Days, NaiveDate};

use crate::error::{Result, ScheduleError};

/// Highest valid weekday index (Sunday).
pub const MAX_WEEKDAY: u8 = 6;

/// Longest lookahead window accepted, in weeks.
pub const MAX_LOOKAHEAD_WEEKS: i32 = 520;

/// Compute the concrete dates of a weekly pattern within `weeks_ahead` weeks of
/// `today`.
///
/// Duplicate weekdays are collapsed. The returned order is not meaningful.
/// An empty pattern yields no dates.
pub fn occurrences(weekdays: &[u8], weeks_ahead: i32, today: NaiveDate) -> Result<Vec<NaiveDate>> {
    let pattern = validate_pattern(weekdays, weeks_ahead)?;
    let today_index = i64::from(today.weekday().num_days_from_monday());

    let mut dates = Vec::new();
    for offset in 0..i64::from(weeks_ahead) {
        for &weekday in &pattern {
            let days_until = (i64::from(weekday) - today_index).rem_euclid(7);
            let days = (days_until + 7 * offset) as u64;
            let date = today.checked_add_days(Days::new(days)).ok_or_else(|| {
                ScheduleError::OccurrenceComputation {
                    message: format!("date overflow {} days after {}", days, today),
                }
            })?;
            dates.push(date);
        }
    }

    Ok(dates)
}

/// Check a pattern and lookahead before anything is written.
pub fn validate_pattern(weekdays: &[u8], weeks_ahead: i32) -> Result<BTreeSet<u8>> {
    if weeks_ahead < 0 {
        return Err(ScheduleError::OccurrenceComputation {
            message: format!("lookahead must not be negative, got {} weeks", weeks_ahead),
        });
    }
    if weeks_ahead > MAX_LOOKAHEAD_WEEKS {
        return Err(ScheduleError::OccurrenceComputation {
            message: format!(
                "lookahead of {} weeks exceeds the maximum of {}",
                weeks_ahead, MAX_LOOKAHEAD_WEEKS
            ),
        });
    }

    if let Some(bad) = weekdays.iter().find(|d| **d > MAX_WEEKDAY) {
        return Err(ScheduleError::OccurrenceComputation {
            message: format!("weekday index {} is outside 0-{}", bad, MAX_WEEKDAY),
        });
    }

    Ok(weekdays.iter().copied().collect())
}

/// Parse a stored weekday pattern.
///
/// Accepts a JSON array (`[0, 2, 4]`) or a comma-separated list (`0,2,4`).
/// Blank input is the empty pattern.
pub fn parse_weekdays(text: &str) -> Result<Vec<u8>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let days: Vec<i64> = if text.starts_with('[') {
        serde_json::from_str(text).map_err(|e| ScheduleError::OccurrenceComputation {
            message: format!("invalid weekday list '{}': {}", text, e),
        })?
    } else {
        text.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<i64>()
                    .map_err(|_| ScheduleError::OccurrenceComputation {
                        message: format!("invalid weekday '{}'", part),
                    })
            })
            .collect::<Result<_>>()?
    };

    days.into_iter()
        .map(|day| {
            u8::try_from(day)
                .ok()
                .filter(|d| *d <= MAX_WEEKDAY)
                .ok_or_else(|| ScheduleError::OccurrenceComputation {
                    message: format!("weekday index {} is outside 0-{}", day, MAX_WEEKDAY),
                })
        })
        .collect()
}
