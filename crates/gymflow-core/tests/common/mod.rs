// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for gymflow-core integration tests.
//!
//! Provides TestContext with a throwaway partition root, an in-memory gym
//! roster, a recording notifier and a clock pinned to Thursday 2024-01-04.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use tempfile::TempDir;
use uuid::Uuid;

use gymflow_core::{
    FixedClock, InMemoryMembership, Notification, Notifier, NotifyError, PartitionOptions,
    PartitionRegistry, RecurringCourse, ScheduleEntry, ScheduleService, TenantRef,
};

/// Records every notification; optionally fails each delivery after recording it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Notification)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Recipients in sorted order.
    pub fn recipients(&self) -> Vec<String> {
        let mut users: Vec<String> = self
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(user, _)| user.clone())
            .collect();
        users.sort();
        users
    }

    pub fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: &str, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((user_id.to_string(), notification.clone()));
        if self.fail {
            return Err(NotifyError {
                user_id: user_id.to_string(),
                reason: "push gateway offline".to_string(),
            });
        }
        Ok(())
    }
}

/// Test context that owns the partition root and the service under test.
pub struct TestContext {
    pub dir: TempDir,
    pub registry: Arc<PartitionRegistry>,
    pub membership: Arc<InMemoryMembership>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: ScheduleService,
}

impl TestContext {
    /// Context with a two-week lookahead and a working notifier.
    pub fn new() -> Self {
        Self::build(2, Arc::new(RecordingNotifier::default()), PartitionOptions::default())
    }

    pub fn with_notifier(notifier: RecordingNotifier) -> Self {
        Self::build(2, Arc::new(notifier), PartitionOptions::default())
    }

    pub fn with_lookahead(weeks: i32) -> Self {
        Self::build(
            weeks,
            Arc::new(RecordingNotifier::default()),
            PartitionOptions::default(),
        )
    }

    /// Context whose registry keeps at most `max_open_partitions` idle partitions open.
    pub fn with_max_open_partitions(max_open_partitions: usize) -> Self {
        Self::build(
            2,
            Arc::new(RecordingNotifier::default()),
            PartitionOptions {
                max_open_partitions,
                ..PartitionOptions::default()
            },
        )
    }

    fn build(weeks: i32, notifier: Arc<RecordingNotifier>, options: PartitionOptions) -> Self {
        let dir = TempDir::new().expect("Failed to create partition root");
        let registry = Arc::new(PartitionRegistry::with_options(dir.path(), options));
        let membership = Arc::new(InMemoryMembership::new());

        let service = ScheduleService::builder()
            .registry(registry.clone())
            .membership(membership.clone())
            .notifier(notifier.clone())
            .clock(Arc::new(FixedClock(today())))
            .lookahead_weeks(weeks)
            .build()
            .expect("Failed to build schedule service");

        Self {
            dir,
            registry,
            membership,
            notifier,
            service,
        }
    }

    /// Same partitions and roster, different "today".
    pub fn service_at(&self, date: NaiveDate) -> ScheduleService {
        ScheduleService::builder()
            .registry(self.registry.clone())
            .membership(self.membership.clone())
            .notifier(self.notifier.clone())
            .clock(Arc::new(FixedClock(date)))
            .lookahead_weeks(self.service.lookahead_weeks())
            .build()
            .expect("Failed to build schedule service")
    }

    /// All entries of a course in one tenant's partition.
    pub async fn course_entries(&self, tenant: &TenantRef, course_id: &str) -> Vec<ScheduleEntry> {
        self.registry
            .resolve_tenant(tenant)
            .await
            .expect("Failed to resolve partition")
            .schedule()
            .list_for_course(course_id)
            .await
            .expect("Failed to list entries")
    }

    pub async fn course_dates(&self, tenant: &TenantRef, course_id: &str) -> Vec<NaiveDate> {
        self.course_entries(tenant, course_id)
            .await
            .into_iter()
            .map(|e| e.date)
            .collect()
    }

    /// Make a tenant's partition location unusable by putting a directory there.
    pub fn block_partition(&self, tenant: &TenantRef) {
        std::fs::create_dir_all(self.registry.locator(tenant))
            .expect("Failed to create blocking directory");
    }
}

/// Thursday.
pub fn today() -> NaiveDate {
    date(2024, 1, 4)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A Monday 07:00 HIIT course for trainer `t1` in gym `g1`, with a unique id.
pub fn hiit_course() -> RecurringCourse {
    RecurringCourse {
        id: format!("course-{}", Uuid::new_v4()),
        trainer_id: "t1".to_string(),
        gym_id: Some("g1".to_string()),
        weekdays: vec![0],
        time: "07:00".to_string(),
        duration: 45,
        name: "HIIT".to_string(),
    }
}
