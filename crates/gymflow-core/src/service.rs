// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Course lifecycle entry point.
//!
//! The course CRUD layer calls [`ScheduleService`] after each mutation:
//!
//! | Mutation | Action |
//! |----------|--------|
//! | create with a non-empty weekday set | synchronize `lookahead_weeks` ahead |
//! | update touching days, time, duration or name | regenerate |
//! | update moving the course to another gym or trainer | purge the old targets, regenerate |
//! | update touching nothing schedule-related | nothing |
//! | delete (before the course record is removed) | purge |
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gymflow_core::{InMemoryMembership, PartitionRegistry, ScheduleService};
//!
//! let service = ScheduleService::builder()
//!     .registry(Arc::new(PartitionRegistry::new(".data")))
//!     .membership(Arc::new(InMemoryMembership::new()))
//!     .build()?;
//!
//! let report = service.course_created(&course).await?;
//! ```

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tracing::debug;

use crate::config::{Config, DEFAULT_LOOKAHEAD_WEEKS};
use crate::course::RecurringCourse;
use crate::directory::MembershipDirectory;
use crate::error::{Result, ScheduleError};
use crate::notify::{Notifier, TracingNotifier};
use crate::partition::{PartitionRegistry, TenantRef};
use crate::recurrence::{MAX_LOOKAHEAD_WEEKS, validate_pattern};
use crate::schedule::ScheduleEntry;
use crate::sync::{
    DEFAULT_FANOUT_CONCURRENCY, FanoutSynchronizer, PurgeReport, RegenerationCoordinator,
    RegenerationReport, SyncReport,
};

/// Source of "today" for occurrence anchoring and future/past cut-offs.
pub trait Clock: Send + Sync {
    /// Current calendar date.
    fn today(&self) -> NaiveDate;
}

/// Local wall-clock date.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// A clock stuck on one date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Builder for [`ScheduleService`].
pub struct ScheduleServiceBuilder {
    registry: Option<Arc<PartitionRegistry>>,
    membership: Option<Arc<dyn MembershipDirectory>>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    lookahead_weeks: i32,
    fanout_concurrency: usize,
}

impl std::fmt::Debug for ScheduleServiceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleServiceBuilder")
            .field("registry", &self.registry)
            .field("membership", &self.membership.as_ref().map(|_| "..."))
            .field("lookahead_weeks", &self.lookahead_weeks)
            .field("fanout_concurrency", &self.fanout_concurrency)
            .finish()
    }
}

impl Default for ScheduleServiceBuilder {
    fn default() -> Self {
        Self {
            registry: None,
            membership: None,
            notifier: Arc::new(TracingNotifier),
            clock: Arc::new(SystemClock),
            lookahead_weeks: DEFAULT_LOOKAHEAD_WEEKS,
            fanout_concurrency: DEFAULT_FANOUT_CONCURRENCY,
        }
    }
}

impl ScheduleServiceBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply lookahead and concurrency from configuration.
    pub fn config(mut self, config: &Config) -> Self {
        self.lookahead_weeks = config.lookahead_weeks;
        self.fanout_concurrency = config.fanout_concurrency;
        self
    }

    /// Set the partition registry (required).
    pub fn registry(mut self, registry: Arc<PartitionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the membership directory (required).
    pub fn membership(mut self, membership: Arc<dyn MembershipDirectory>) -> Self {
        self.membership = Some(membership);
        self
    }

    /// Set the notifier.
    ///
    /// Default: [`TracingNotifier`]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Set the clock.
    ///
    /// Default: [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Weeks materialized on create and regenerate.
    ///
    /// Default: 4
    pub fn lookahead_weeks(mut self, weeks: i32) -> Self {
        self.lookahead_weeks = weeks;
        self
    }

    /// Client partitions written concurrently.
    ///
    /// Default: 8
    pub fn fanout_concurrency(mut self, concurrency: usize) -> Self {
        self.fanout_concurrency = concurrency;
        self
    }

    /// Build the service.
    ///
    /// Returns an error if required fields are missing or the lookahead is out of range.
    pub fn build(self) -> Result<ScheduleService> {
        let registry = self.registry.ok_or_else(|| ScheduleError::Validation {
            field: "registry".to_string(),
            message: "is required".to_string(),
        })?;
        let membership = self.membership.ok_or_else(|| ScheduleError::Validation {
            field: "membership".to_string(),
            message: "is required".to_string(),
        })?;
        if !(0..=MAX_LOOKAHEAD_WEEKS).contains(&self.lookahead_weeks) {
            return Err(ScheduleError::Validation {
                field: "lookahead_weeks".to_string(),
                message: format!(
                    "must be between 0 and {}, got {}",
                    MAX_LOOKAHEAD_WEEKS, self.lookahead_weeks
                ),
            });
        }

        let synchronizer = FanoutSynchronizer::new(registry.clone(), membership, self.notifier)
            .with_concurrency(self.fanout_concurrency);

        Ok(ScheduleService {
            registry,
            coordinator: RegenerationCoordinator::new(synchronizer),
            clock: self.clock,
            lookahead_weeks: self.lookahead_weeks,
        })
    }
}

/// Reacts to course mutations by keeping every affected calendar in step.
pub struct ScheduleService {
    registry: Arc<PartitionRegistry>,
    coordinator: RegenerationCoordinator,
    clock: Arc<dyn Clock>,
    lookahead_weeks: i32,
}

impl std::fmt::Debug for ScheduleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleService")
            .field("registry", &self.registry)
            .field("lookahead_weeks", &self.lookahead_weeks)
            .finish()
    }
}

impl ScheduleService {
    /// Create a new builder for configuring the service.
    pub fn builder() -> ScheduleServiceBuilder {
        ScheduleServiceBuilder::new()
    }

    /// The partition registry.
    pub fn registry(&self) -> &Arc<PartitionRegistry> {
        &self.registry
    }

    /// Today according to the configured clock.
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Weeks materialized on create and regenerate.
    pub fn lookahead_weeks(&self) -> i32 {
        self.lookahead_weeks
    }

    /// A course was created. Returns `None` when it does not recur.
    pub async fn course_created(&self, course: &RecurringCourse) -> Result<Option<SyncReport>> {
        if !course.is_recurring() {
            course.validate()?;
            debug!(course_id = %course.id, "Course has no weekdays, nothing to schedule");
            return Ok(None);
        }

        self.synchronize(course).await.map(Some)
    }

    /// A course was edited. Returns `None` when no schedule-relevant field changed.
    pub async fn course_updated(
        &self,
        previous: &RecurringCourse,
        current: &RecurringCourse,
    ) -> Result<Option<RegenerationReport>> {
        if previous.id != current.id {
            return Err(ScheduleError::invalid_course(
                "id",
                format!("cannot change from '{}' to '{}'", previous.id, current.id),
            ));
        }
        let moved = previous.gym() != current.gym() || previous.trainer_id != current.trainer_id;
        if !moved && !current.schedule_changed(previous) {
            debug!(course_id = %current.id, "No schedule-relevant change");
            return Ok(None);
        }

        current.validate()?;
        validate_pattern(&current.weekdays, self.lookahead_weeks)?;

        // Partitions reached only through the old owner or gym are not visited
        // by the regeneration below
        let previous_purge = if moved {
            Some(self.coordinator.purge(previous, self.today()).await?)
        } else {
            None
        };

        let mut report = self.regenerate(current).await?;
        if let Some(purge) = previous_purge {
            report.absorb_purge(purge);
        }

        Ok(Some(report))
    }

    /// A course is about to be deleted.
    pub async fn course_deleted(&self, course: &RecurringCourse) -> Result<PurgeReport> {
        self.purge(course).await
    }

    /// Write the course's occurrences for the configured lookahead.
    pub async fn synchronize(&self, course: &RecurringCourse) -> Result<SyncReport> {
        self.coordinator
            .synchronizer()
            .synchronize(course, self.lookahead_weeks, self.today())
            .await
    }

    /// Replace the course's future entries with its current pattern.
    pub async fn regenerate(&self, course: &RecurringCourse) -> Result<RegenerationReport> {
        self.coordinator
            .regenerate(course, self.lookahead_weeks, self.today())
            .await
    }

    /// Remove the course's future entries.
    pub async fn purge(&self, course: &RecurringCourse) -> Result<PurgeReport> {
        self.coordinator.purge(course, self.today()).await
    }

    /// A tenant's entries from today through the configured lookahead.
    pub async fn upcoming(&self, tenant: &TenantRef) -> Result<Vec<ScheduleEntry>> {
        self.entries_between(tenant, None, None).await
    }

    /// A tenant's entries within `[from, to]`.
    ///
    /// `from` defaults to today and `to` to the end of the lookahead window.
    pub async fn entries_between(
        &self,
        tenant: &TenantRef,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<ScheduleEntry>> {
        let today = self.today();
        let from = from.unwrap_or(today);
        let to = match to {
            Some(to) => to,
            None => self.window_end(today)?,
        };
        if from > to {
            return Err(ScheduleError::Validation {
                field: "to".to_string(),
                message: format!("{} is before {}", to, from),
            });
        }

        let handle = self.registry.resolve_tenant(tenant).await?;
        handle.schedule().list_range(from, to).await
    }

    /// Mark one of a tenant's entries completed or not completed.
    pub async fn complete_entry(
        &self,
        tenant: &TenantRef,
        entry_id: i64,
        completed: bool,
    ) -> Result<ScheduleEntry> {
        let store = self.registry.resolve_tenant(tenant).await?.schedule();
        let not_found = || ScheduleError::NotFound {
            what: format!("Entry {} of {}", entry_id, tenant),
        };

        if !store.set_completed(entry_id, completed).await? {
            return Err(not_found());
        }
        store.get(entry_id).await?.ok_or_else(not_found)
    }

    fn window_end(&self, today: NaiveDate) -> Result<NaiveDate> {
        let days = u64::try_from(self.lookahead_weeks).unwrap_or(0) * 7;
        today
            .checked_add_days(Days::new(days))
            .ok_or_else(|| ScheduleError::OccurrenceComputation {
                message: format!("{} weeks after {} is out of range", self.lookahead_weeks, today),
            })
    }
}
