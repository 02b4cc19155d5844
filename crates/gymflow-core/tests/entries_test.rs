// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for reading and completing a tenant's entries through the service.

mod common;

use common::{TestContext, date, hiit_course};
use gymflow_core::{NewScheduleEntry, ScheduleError, TenantRef};

async fn synced() -> (TestContext, TenantRef) {
    let ctx = TestContext::new();
    ctx.membership.join("g1", "c1");
    ctx.service.synchronize(&hiit_course()).await.unwrap();
    let client = TenantRef::client("c1");
    ctx.registry
        .resolve_tenant(&client)
        .await
        .unwrap()
        .schedule()
        .insert(&NewScheduleEntry::personal(date(2024, 1, 2), "06:30", "Run"))
        .await
        .unwrap();
    (ctx, client)
}

fn dates(entries: &[gymflow_core::ScheduleEntry]) -> Vec<chrono::NaiveDate> {
    entries.iter().map(|e| e.date).collect()
}

#[tokio::test]
async fn test_upcoming_covers_today_through_lookahead() {
    let (ctx, client) = synced().await;

    let entries = ctx.service.upcoming(&client).await.unwrap();

    assert_eq!(dates(&entries), vec![date(2024, 1, 8), date(2024, 1, 15)]);
}

#[tokio::test]
async fn test_from_alone_ends_at_lookahead() {
    let (ctx, client) = synced().await;

    let entries = ctx
        .service
        .entries_between(&client, Some(date(2024, 1, 1)), None)
        .await
        .unwrap();

    assert_eq!(
        dates(&entries),
        vec![date(2024, 1, 2), date(2024, 1, 8), date(2024, 1, 15)]
    );
}

#[tokio::test]
async fn test_to_alone_starts_today() {
    let (ctx, client) = synced().await;

    let entries = ctx
        .service
        .entries_between(&client, None, Some(date(2024, 1, 10)))
        .await
        .unwrap();

    assert_eq!(dates(&entries), vec![date(2024, 1, 8)]);
}

#[tokio::test]
async fn test_explicit_range_is_inclusive() {
    let (ctx, client) = synced().await;

    let entries = ctx
        .service
        .entries_between(&client, Some(date(2024, 1, 2)), Some(date(2024, 1, 8)))
        .await
        .unwrap();

    assert_eq!(dates(&entries), vec![date(2024, 1, 2), date(2024, 1, 8)]);
}

#[tokio::test]
async fn test_inverted_range_is_rejected() {
    let (ctx, client) = synced().await;

    let err = ctx
        .service
        .entries_between(&client, Some(date(2024, 2, 1)), None)
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "VALIDATION_ERROR");
    assert!(err.to_string().contains("'to'"));
}

#[tokio::test]
async fn test_complete_entry_round_trip() {
    let (ctx, client) = synced().await;
    let entry = ctx.service.upcoming(&client).await.unwrap()[0].clone();

    let done = ctx
        .service
        .complete_entry(&client, entry.id, true)
        .await
        .unwrap();
    assert!(done.completed);
    assert_eq!(done.id, entry.id);

    let reopened = ctx
        .service
        .complete_entry(&client, entry.id, false)
        .await
        .unwrap();
    assert!(!reopened.completed);
}

#[tokio::test]
async fn test_complete_unknown_entry_is_not_found() {
    let (ctx, client) = synced().await;

    let err = ctx
        .service
        .complete_entry(&client, 9_999, true)
        .await
        .unwrap_err();

    assert!(matches!(err, ScheduleError::NotFound { .. }));
    assert_eq!(err.error_code(), "NOT_FOUND");
    assert!(err.to_string().contains("client:c1"));
}

#[tokio::test]
async fn test_completed_entry_survives_purge() {
    let ctx = TestContext::new();
    ctx.membership.join("g1", "c1");
    let course = hiit_course();
    ctx.service.synchronize(&course).await.unwrap();
    let client = TenantRef::client("c1");
    let first = ctx.service.upcoming(&client).await.unwrap()[0].id;
    ctx.service.complete_entry(&client, first, true).await.unwrap();

    let report = ctx.service.purge(&course).await.unwrap();

    assert_eq!(report.deleted_client, 1);
    let left = ctx.service.upcoming(&client).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, first);
}
