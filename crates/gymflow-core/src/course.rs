// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Recurring courses as seen by the scheduler.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};
use crate::recurrence::MAX_WEEKDAY;
use crate::schedule::{EntryKind, NewScheduleEntry};

/// A weekly course owned by one trainer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringCourse {
    /// Course identifier.
    pub id: String,
    /// Owning trainer.
    pub trainer_id: String,
    /// Gym whose members receive the course, if any.
    #[serde(default)]
    pub gym_id: Option<String>,
    /// Weekday indices, 0 = Monday. Empty means no recurrence.
    #[serde(default)]
    pub weekdays: Vec<u8>,
    /// Start time, `HH:MM`.
    pub time: String,
    /// Duration in minutes.
    pub duration: i64,
    /// Display name.
    pub name: String,
}

impl RecurringCourse {
    /// Reject records that must never reach a partition.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ScheduleError::invalid_course("id", "must not be empty"));
        }
        if self.trainer_id.trim().is_empty() {
            return Err(ScheduleError::invalid_course("trainer_id", "must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(ScheduleError::invalid_course("name", "must not be empty"));
        }
        if NaiveTime::parse_from_str(&self.time, "%H:%M").is_err() {
            return Err(ScheduleError::invalid_course(
                "time",
                format!("'{}' is not a HH:MM time", self.time),
            ));
        }
        if self.duration <= 0 {
            return Err(ScheduleError::invalid_course(
                "duration",
                format!("must be positive, got {}", self.duration),
            ));
        }
        if let Some(bad) = self.weekdays.iter().find(|d| **d > MAX_WEEKDAY) {
            return Err(ScheduleError::OccurrenceComputation {
                message: format!("weekday index {} is outside 0-{}", bad, MAX_WEEKDAY),
            });
        }
        Ok(())
    }

    /// Whether the course recurs at all.
    pub fn is_recurring(&self) -> bool {
        !self.weekdays.is_empty()
    }

    /// Gym id, ignoring blank values.
    pub fn gym(&self) -> Option<&str> {
        self.gym_id.as_deref().filter(|g| !g.trim().is_empty())
    }

    /// Title shown on client calendars.
    pub fn client_title(&self) -> String {
        format!("{} at {}", self.name, self.time)
    }

    /// Whether a change from `previous` requires regenerating entries.
    pub fn schedule_changed(&self, previous: &RecurringCourse) -> bool {
        let mut before = previous.weekdays.clone();
        let mut after = self.weekdays.clone();
        before.sort_unstable();
        before.dedup();
        after.sort_unstable();
        after.dedup();

        before != after
            || previous.time != self.time
            || previous.duration != self.duration
            || previous.name != self.name
            || previous.gym() != self.gym()
    }

    pub(crate) fn trainer_entry(&self, date: chrono::NaiveDate) -> NewScheduleEntry {
        self.entry(date, self.name.clone())
    }

    pub(crate) fn client_entry(&self, date: chrono::NaiveDate) -> NewScheduleEntry {
        self.entry(date, self.client_title())
    }

    fn entry(&self, date: chrono::NaiveDate, title: String) -> NewScheduleEntry {
        NewScheduleEntry {
            date,
            time: self.time.clone(),
            title,
            kind: EntryKind::Course,
            duration: self.duration,
            course_id: Some(self.id.clone()),
            details: None,
        }
    }
}
