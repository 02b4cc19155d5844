// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Schedule entries stored inside each tenant partition.

mod store;

pub use self::store::{InsertOutcome, ScheduleStore};

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind discriminator of a schedule entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Individual training session.
    Workout,
    /// Occurrence of a recurring course.
    Course,
    /// Personal appointment.
    Personal,
    /// Rest day.
    Rest,
    /// Anything else the profile layer stores.
    #[serde(untagged)]
    Other(String),
}

impl EntryKind {
    /// Value stored in the `kind` column.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Workout => "workout",
            Self::Course => "course",
            Self::Personal => "personal",
            Self::Rest => "rest",
            Self::Other(kind) => kind,
        }
    }
}

impl From<&str> for EntryKind {
    fn from(value: &str) -> Self {
        match value {
            "workout" => Self::Workout,
            "course" => Self::Course,
            "personal" => Self::Personal,
            "rest" => Self::Rest,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schedule entry record from a partition.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct ScheduleEntry {
    /// Partition-local identifier.
    pub id: i64,
    /// Calendar date of the entry.
    pub date: NaiveDate,
    /// Time of day, as entered (`HH:MM`).
    pub time: String,
    /// Display title.
    pub title: String,
    /// Kind discriminator (workout, course, personal, rest, ...).
    pub kind: String,
    /// Duration in minutes.
    pub duration: i64,
    /// Recurring course that generated this entry, if any.
    pub course_id: Option<String>,
    /// Set by the owning user once the session happened.
    pub completed: bool,
    /// Opaque detail payload.
    pub details: Option<String>,
}

impl ScheduleEntry {
    /// Parsed kind discriminator.
    pub fn entry_kind(&self) -> EntryKind {
        EntryKind::from(self.kind.as_str())
    }
}

/// Values for a new schedule entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NewScheduleEntry {
    /// Calendar date of the entry.
    pub date: NaiveDate,
    /// Time of day (`HH:MM`).
    pub time: String,
    /// Display title.
    pub title: String,
    /// Kind discriminator.
    pub kind: EntryKind,
    /// Duration in minutes.
    pub duration: i64,
    /// Recurring course reference.
    pub course_id: Option<String>,
    /// Opaque detail payload.
    pub details: Option<String>,
}

impl NewScheduleEntry {
    /// An unlinked entry created by the owning user.
    pub fn personal(date: NaiveDate, time: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            date,
            time: time.into(),
            title: title.into(),
            kind: EntryKind::Personal,
            duration: 60,
            course_id: None,
            details: None,
        }
    }

    /// Set the kind.
    pub fn kind(mut self, kind: EntryKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the duration in minutes.
    pub fn duration(mut self, minutes: i64) -> Self {
        self.duration = minutes;
        self
    }

    /// Attach a detail payload.
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
