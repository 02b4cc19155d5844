// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Regeneration coordinator: delete-future-then-recreate on course edits, and
//! delete-future on course removal.

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{FanoutSynchronizer, SyncReport, TargetOutcome};
use crate::course::RecurringCourse;
use crate::error::{Result, ScheduleError};
use crate::partition::TenantRef;
use crate::recurrence::occurrences;

/// Result of deleting a course's future entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Entries removed from the trainer's partition.
    pub deleted_trainer: u64,
    /// Entries removed across client partitions.
    pub deleted_client: u64,
    /// Client partitions that could not be cleaned.
    pub failed_tenants: Vec<TenantRef>,
}

impl PurgeReport {
    /// The skipped partitions as an error value, if there were any.
    pub fn partial_failure(&self) -> Option<ScheduleError> {
        partial_failure(&self.failed_tenants)
    }
}

/// Result of a regeneration (purge followed by fan-out).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegenerationReport {
    /// Entries removed from the trainer's partition.
    pub deleted_trainer: u64,
    /// Entries removed across client partitions.
    pub deleted_client: u64,
    /// Entries recreated in the trainer's partition.
    pub trainer_created: usize,
    /// Entries recreated across client partitions.
    pub client_created: usize,
    /// Client partitions skipped by either phase.
    pub failed_tenants: Vec<TenantRef>,
    /// Per (tenant, date) outcomes of the recreate phase.
    pub outcomes: Vec<TargetOutcome>,
}

impl RegenerationReport {
    fn new(purge: PurgeReport, sync: SyncReport) -> Self {
        let mut failed_tenants = purge.failed_tenants;
        failed_tenants.extend(sync.failed_tenants);
        failed_tenants.sort();
        failed_tenants.dedup();

        Self {
            deleted_trainer: purge.deleted_trainer,
            deleted_client: purge.deleted_client,
            trainer_created: sync.trainer_entries_created,
            client_created: sync.client_entries_created,
            failed_tenants,
            outcomes: sync.outcomes,
        }
    }

    /// Fold an extra deletion pass (e.g. over a previous gym) into this report.
    pub fn absorb_purge(&mut self, purge: PurgeReport) {
        self.deleted_trainer += purge.deleted_trainer;
        self.deleted_client += purge.deleted_client;
        self.failed_tenants.extend(purge.failed_tenants);
        self.failed_tenants.sort();
        self.failed_tenants.dedup();
    }

    /// The skipped partitions as an error value, if there were any.
    pub fn partial_failure(&self) -> Option<ScheduleError> {
        partial_failure(&self.failed_tenants)
    }
}

fn partial_failure(failed: &[TenantRef]) -> Option<ScheduleError> {
    if failed.is_empty() {
        None
    } else {
        Some(ScheduleError::RegenerationPartialFailure {
            failed: failed.to_vec(),
        })
    }
}

/// Rebuilds a course's future entries after edits and removes them on deletion.
///
/// Only entries with `date >= today` and `completed == false` are ever deleted.
/// Clients are enumerated from the current gym roster; clients who left the gym
/// since the last generation keep whatever entries they had.
#[derive(Debug, Clone)]
pub struct RegenerationCoordinator {
    synchronizer: FanoutSynchronizer,
}

impl RegenerationCoordinator {
    /// Create a coordinator that recreates entries through `synchronizer`.
    pub fn new(synchronizer: FanoutSynchronizer) -> Self {
        Self { synchronizer }
    }

    /// The synchronizer used for the recreate phase.
    pub fn synchronizer(&self) -> &FanoutSynchronizer {
        &self.synchronizer
    }

    /// Delete the course's future non-completed entries everywhere, then write
    /// the current pattern again.
    ///
    /// The course and lookahead are validated before anything is deleted.
    #[instrument(skip(self, course), fields(course_id = %course.id, trainer_id = %course.trainer_id))]
    pub async fn regenerate(
        &self,
        course: &RecurringCourse,
        weeks_ahead: i32,
        today: NaiveDate,
    ) -> Result<RegenerationReport> {
        course.validate()?;
        let dates = occurrences(&course.weekdays, weeks_ahead, today)?;
        let clients = self.synchronizer.roster(course).await?;

        let purge = self.purge_targets(course, today, &clients).await?;
        let sync = self
            .synchronizer
            .synchronize_targets(course, &dates, clients)
            .await?;

        let report = RegenerationReport::new(purge, sync);
        info!(
            deleted_trainer = report.deleted_trainer,
            deleted_client = report.deleted_client,
            trainer_created = report.trainer_created,
            client_created = report.client_created,
            failed_tenants = report.failed_tenants.len(),
            "Course regenerated"
        );

        Ok(report)
    }

    /// Delete the course's future non-completed entries everywhere without
    /// recreating them.
    #[instrument(skip(self, course), fields(course_id = %course.id, trainer_id = %course.trainer_id))]
    pub async fn purge(&self, course: &RecurringCourse, today: NaiveDate) -> Result<PurgeReport> {
        if course.id.trim().is_empty() {
            return Err(ScheduleError::invalid_course("id", "must not be empty"));
        }
        let clients = self.synchronizer.roster(course).await?;

        let report = self.purge_targets(course, today, &clients).await?;
        info!(
            deleted_trainer = report.deleted_trainer,
            deleted_client = report.deleted_client,
            failed_tenants = report.failed_tenants.len(),
            "Course purged"
        );

        Ok(report)
    }

    async fn purge_targets(
        &self,
        course: &RecurringCourse,
        today: NaiveDate,
        clients: &[String],
    ) -> Result<PurgeReport> {
        let registry = self.synchronizer.registry();

        let trainer = registry.trainer(&course.trainer_id).await?;
        let deleted_trainer = trainer
            .schedule()
            .delete_future_course_entries(&course.id, today)
            .await?;

        let results: Vec<_> = stream::iter(clients)
            .map(|client_id| async move {
                let tenant = TenantRef::client(client_id.as_str());
                let result = match registry.resolve_tenant(&tenant).await {
                    Ok(handle) => {
                        handle
                            .schedule()
                            .delete_future_course_entries(&course.id, today)
                            .await
                    }
                    Err(e) => Err(e),
                };
                (tenant, result)
            })
            .buffer_unordered(self.synchronizer.concurrency())
            .collect()
            .await;

        let mut report = PurgeReport {
            deleted_trainer,
            ..PurgeReport::default()
        };
        for (tenant, result) in results {
            match result {
                Ok(deleted) => report.deleted_client += deleted,
                Err(e) => {
                    warn!(tenant = %tenant, error = %e, "Skipping client partition during purge");
                    report.failed_tenants.push(tenant);
                }
            }
        }
        report.failed_tenants.sort();

        Ok(report)
    }
}
