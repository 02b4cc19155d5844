// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fan-out synchronizer: writes a course's occurrences into the trainer's
//! partition and into every gym member's partition.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use super::{EntryOutcome, SyncReport};
use crate::course::RecurringCourse;
use crate::directory::MembershipDirectory;
use crate::error::Result;
use crate::notify::{Notification, Notifier};
use crate::partition::{PartitionRegistry, TenantKind, TenantRef};
use crate::recurrence::occurrences;
use crate::schedule::InsertOutcome;

/// Default number of client partitions written concurrently.
pub const DEFAULT_FANOUT_CONCURRENCY: usize = 8;

/// Projects recurring courses into tenant partitions.
#[derive(Clone)]
pub struct FanoutSynchronizer {
    registry: Arc<PartitionRegistry>,
    membership: Arc<dyn MembershipDirectory>,
    notifier: Arc<dyn Notifier>,
    concurrency: usize,
}

impl std::fmt::Debug for FanoutSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSynchronizer")
            .field("registry", &self.registry)
            .field("membership", &"...")
            .field("notifier", &"...")
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl FanoutSynchronizer {
    /// Create a synchronizer over the given registry and collaborators.
    pub fn new(
        registry: Arc<PartitionRegistry>,
        membership: Arc<dyn MembershipDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            membership,
            notifier,
            concurrency: DEFAULT_FANOUT_CONCURRENCY,
        }
    }

    /// Limit how many client partitions are written at once. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The partition registry used for every write.
    pub fn registry(&self) -> &Arc<PartitionRegistry> {
        &self.registry
    }

    pub(crate) fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Write the course's occurrences for the next `weeks_ahead` weeks.
    ///
    /// Already-present (course, date) entries are skipped, so repeating the call
    /// creates nothing. Trainer-side failures abort the call; client-side
    /// failures are recorded in the report.
    #[instrument(skip(self, course), fields(course_id = %course.id, trainer_id = %course.trainer_id))]
    pub async fn synchronize(
        &self,
        course: &RecurringCourse,
        weeks_ahead: i32,
        today: NaiveDate,
    ) -> Result<SyncReport> {
        course.validate()?;
        let dates = occurrences(&course.weekdays, weeks_ahead, today)?;
        let clients = self.roster(course).await?;

        self.synchronize_targets(course, &dates, clients).await
    }

    /// Snapshot of the clients a course fans out to.
    pub(crate) async fn roster(&self, course: &RecurringCourse) -> Result<Vec<String>> {
        let Some(gym_id) = course.gym() else {
            return Ok(Vec::new());
        };

        let clients: BTreeSet<String> = self
            .membership
            .list_client_ids(gym_id)
            .await?
            .into_iter()
            .filter(|id| !id.trim().is_empty())
            .collect();

        debug!(gym_id, clients = clients.len(), "Loaded gym roster");
        Ok(clients.into_iter().collect())
    }

    pub(crate) async fn synchronize_targets(
        &self,
        course: &RecurringCourse,
        dates: &[NaiveDate],
        clients: Vec<String>,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        if dates.is_empty() {
            debug!("Course has no occurrences in the lookahead window");
            return Ok(report);
        }

        // The owner's calendar must always be written
        let trainer = self.registry.trainer(&course.trainer_id).await?;
        let store = trainer.schedule();
        for &date in dates {
            let outcome = match store
                .insert_course_entry_if_absent(&course.trainer_entry(date))
                .await?
            {
                InsertOutcome::Created(entry_id) => EntryOutcome::Created { entry_id },
                InsertOutcome::Skipped => EntryOutcome::Skipped,
            };
            report.record(trainer.tenant(), date, outcome);
        }

        let client_results: Vec<_> = stream::iter(clients)
            .map(|client_id| self.synchronize_client(course, client_id, dates))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (tenant, outcomes) in client_results {
            for (date, outcome) in outcomes {
                report.record(&tenant, date, outcome);
            }
        }

        let report = report.finish();
        self.notify_clients(course, &report).await;

        info!(
            dates = dates.len(),
            trainer_created = report.trainer_entries_created,
            client_created = report.client_entries_created,
            skipped = report.skipped(),
            failed_tenants = report.failed_tenants.len(),
            "Course synchronized"
        );

        Ok(report)
    }

    async fn synchronize_client(
        &self,
        course: &RecurringCourse,
        client_id: String,
        dates: &[NaiveDate],
    ) -> (TenantRef, Vec<(NaiveDate, EntryOutcome)>) {
        let tenant = TenantRef::client(client_id);

        let handle = match self.registry.resolve_tenant(&tenant).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "Skipping unavailable client partition");
                let reason = e.to_string();
                let outcomes = dates
                    .iter()
                    .map(|&date| {
                        (
                            date,
                            EntryOutcome::Failed {
                                reason: reason.clone(),
                            },
                        )
                    })
                    .collect();
                return (tenant, outcomes);
            }
        };

        let store = handle.schedule();
        let mut outcomes = Vec::with_capacity(dates.len());
        for &date in dates {
            let outcome = match store
                .insert_course_entry_if_absent(&course.client_entry(date))
                .await
            {
                Ok(InsertOutcome::Created(entry_id)) => EntryOutcome::Created { entry_id },
                Ok(InsertOutcome::Skipped) => EntryOutcome::Skipped,
                Err(e) => {
                    warn!(tenant = %tenant, %date, error = %e, "Failed to write client entry");
                    EntryOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push((date, outcome));
        }

        (tenant, outcomes)
    }

    async fn notify_clients(&self, course: &RecurringCourse, report: &SyncReport) {
        let recipients: BTreeSet<&str> = report
            .outcomes
            .iter()
            .filter(|o| {
                o.tenant.kind == TenantKind::Client
                    && matches!(o.outcome, EntryOutcome::Created { .. })
            })
            .map(|o| o.tenant.id.as_str())
            .collect();

        if recipients.is_empty() {
            return;
        }

        let notification = Notification::course(&course.id, course.client_title());
        let notification = &notification;
        stream::iter(recipients)
            .for_each_concurrent(self.concurrency, |client_id| async move {
                if let Err(e) = self.notifier.notify(client_id, notification).await {
                    warn!(client_id, error = %e, "Course notification failed");
                }
            })
            .await;
    }
}
