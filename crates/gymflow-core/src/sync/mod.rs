// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Course fan-out and regeneration across tenant partitions.
//!
//! There is no transaction spanning partitions. Every (tenant, date) write is
//! independent and idempotent on the (course id, date) key, so an interrupted
//! pass leaves missing entries only, and the next pass fills them in.
//!
//! Failure policy:
//!
//! | Scope | Policy |
//! |-------|--------|
//! | Trainer partition (open, write, delete) | fatal, returned as `Err` |
//! | Membership lookup | fatal, returned as `Err` |
//! | One client partition | recorded in the report, pass continues |
//! | Notification | logged, never affects the report |

mod fanout;
mod regenerate;

pub use self::fanout::{DEFAULT_FANOUT_CONCURRENCY, FanoutSynchronizer};
pub use self::regenerate::{PurgeReport, RegenerationCoordinator, RegenerationReport};

use chrono::NaiveDate;
use serde::Serialize;

use crate::partition::{TenantKind, TenantRef};

/// What happened to one (tenant, date) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryOutcome {
    /// A new entry was written.
    Created {
        /// Partition-local id of the new entry.
        entry_id: i64,
    },
    /// The partition already had an entry for this course and date.
    Skipped,
    /// The write did not happen.
    Failed {
        /// Why the write failed.
        reason: String,
    },
}

/// Outcome for one tenant and one occurrence date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetOutcome {
    /// Partition written to.
    pub tenant: TenantRef,
    /// Occurrence date.
    pub date: NaiveDate,
    /// Result of the write.
    #[serde(flatten)]
    pub outcome: EntryOutcome,
}

/// Result of a fan-out pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Entries written to the trainer's partition.
    pub trainer_entries_created: usize,
    /// Entries written across all client partitions.
    pub client_entries_created: usize,
    /// Per (tenant, date) outcomes, ordered by tenant then date.
    pub outcomes: Vec<TargetOutcome>,
    /// Client partitions that had at least one failure.
    pub failed_tenants: Vec<TenantRef>,
}

impl SyncReport {
    pub(crate) fn record(&mut self, tenant: &TenantRef, date: NaiveDate, outcome: EntryOutcome) {
        match (&outcome, tenant.kind) {
            (EntryOutcome::Created { .. }, TenantKind::Trainer) => {
                self.trainer_entries_created += 1
            }
            (EntryOutcome::Created { .. }, TenantKind::Client) => self.client_entries_created += 1,
            (EntryOutcome::Failed { .. }, _) => {
                if !self.failed_tenants.contains(tenant) {
                    self.failed_tenants.push(tenant.clone());
                }
            }
            (EntryOutcome::Skipped, _) => {}
        }

        self.outcomes.push(TargetOutcome {
            tenant: tenant.clone(),
            date,
            outcome,
        });
    }

    pub(crate) fn finish(mut self) -> Self {
        self.outcomes
            .sort_by(|a, b| (&a.tenant, a.date).cmp(&(&b.tenant, b.date)));
        self.failed_tenants.sort();
        self
    }

    /// Entries written across all partitions.
    pub fn total_created(&self) -> usize {
        self.trainer_entries_created + self.client_entries_created
    }

    /// Number of (tenant, date) pairs that already had an entry.
    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == EntryOutcome::Skipped)
            .count()
    }

    /// Entries written to one tenant.
    pub fn created_for(&self, tenant: &TenantRef) -> usize {
        self.outcomes
            .iter()
            .filter(|o| &o.tenant == tenant && matches!(o.outcome, EntryOutcome::Created { .. }))
            .count()
    }

    /// Whether every targeted partition was reached.
    pub fn is_complete(&self) -> bool {
        self.failed_tenants.is_empty()
    }
}
