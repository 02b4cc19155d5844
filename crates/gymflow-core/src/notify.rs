// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Best-effort notifications sent after a course fan-out.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

/// Payload delivered to a client whose calendar gained course entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Notification type, always `"course"` for fan-out notifications.
    #[serde(rename = "type")]
    pub kind: String,
    /// Course that produced the entries.
    pub course_id: String,
    /// Title shown to the client.
    pub title: String,
}

impl Notification {
    /// A course notification.
    pub fn course(course_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: "course".to_string(),
            course_id: course_id.into(),
            title: title.into(),
        }
    }
}

/// Notification delivery failed.
#[derive(Debug, thiserror::Error)]
#[error("failed to notify '{user_id}': {reason}")]
pub struct NotifyError {
    /// Intended recipient.
    pub user_id: String,
    /// Why delivery failed.
    pub reason: String,
}

/// Fire-and-forget push channel.
///
/// Failures are reported back for logging only; schedule writes never depend
/// on them.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `notification` to `user_id`.
    async fn notify(&self, user_id: &str, notification: &Notification) -> Result<(), NotifyError>;
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, user_id: &str, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            user_id,
            course_id = %notification.course_id,
            title = %notification.title,
            "Course notification"
        );
        Ok(())
    }
}

/// Notifier that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _user_id: &str, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}
