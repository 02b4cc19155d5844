// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! gymflow Core - Tenant-Partitioned Schedules
//!
//! Every trainer and every client owns an isolated SQLite partition. This crate
//! routes tenants to their partitions and keeps recurring courses projected into
//! the calendars of the owning trainer and of every client in the course's gym.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Course CRUD (external)                            │
//! │                 create / update / delete a course                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         ScheduleService                                 │
//! │        course_created / course_updated / course_deleted                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌───────────────────────┐          ┌──────────────────────────────────────┐
//! │ RegenerationCoordinator│────────▶│         FanoutSynchronizer           │
//! │  delete future entries │          │  occurrences() × (trainer + roster)  │
//! └───────────────────────┘          └──────────────────────────────────────┘
//!           │                                     │            │
//!           ▼                                     ▼            ▼
//! ┌─────────────────────────────────────────┐  ┌─────────────┐ ┌──────────┐
//! │           PartitionRegistry             │  │ Membership  │ │ Notifier │
//! │  trainers/<id>.db   clients/<id>.db ... │  │ Directory   │ │          │
//! └─────────────────────────────────────────┘  └─────────────┘ └──────────┘
//! ```
//!
//! # Partitions
//!
//! [`PartitionRegistry::resolve`] derives a file location from the tenant kind
//! and id, creates the file on first use and applies the embedded partition
//! migrations. Every partition receives the full schema.
//!
//! # Course Operations
//!
//! | Operation | Description |
//! |-----------|-------------|
//! | `synchronize` | Write occurrences for the lookahead window, skipping existing (course, date) entries |
//! | `regenerate` | Delete future non-completed entries of the course, then synchronize |
//! | `purge` | Delete future non-completed entries of the course |
//!
//! Trainer-side failures are returned as errors. Client-side failures are
//! collected in the returned report so a course edit can succeed with a warning.

pub mod config;
pub mod course;
pub mod directory;
pub mod error;
pub mod migrations;
pub mod notify;
pub mod partition;
pub mod recurrence;
pub mod schedule;
pub mod service;
pub mod sync;

pub use config::Config;
pub use course::RecurringCourse;
pub use directory::{InMemoryMembership, MembershipDirectory, SqliteMembershipDirectory};
pub use error::{Result, ScheduleError};
pub use notify::{NoopNotifier, Notification, Notifier, NotifyError, TracingNotifier};
pub use partition::{PartitionHandle, PartitionOptions, PartitionRegistry, TenantKind, TenantRef};
pub use recurrence::occurrences;
pub use schedule::{EntryKind, NewScheduleEntry, ScheduleEntry, ScheduleStore};
pub use service::{Clock, FixedClock, ScheduleService, ScheduleServiceBuilder, SystemClock};
pub use sync::{
    EntryOutcome, FanoutSynchronizer, PurgeReport, RegenerationCoordinator, RegenerationReport,
    SyncReport, TargetOutcome,
};
