// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gym membership directory.
//!
//! The fan-out asks the directory for a gym's roster once per pass. The roster
//! is a snapshot: clients joining after the call are picked up by the next
//! regeneration, not by the running one.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

use crate::error::{Result, ScheduleError};
use crate::migrations;

/// Source of fan-out targets.
#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    /// Client ids currently in `gym_id`, read in one go.
    async fn list_client_ids(&self, gym_id: &str) -> Result<Vec<String>>;
}

/// Membership directory held in memory.
#[derive(Debug, Default)]
pub struct InMemoryMembership {
    gyms: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl InMemoryMembership {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client to a gym.
    pub fn join(&self, gym_id: &str, client_id: &str) {
        self.gyms
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(gym_id.to_string())
            .or_default()
            .insert(client_id.to_string());
    }

    /// Remove a client from a gym.
    pub fn leave(&self, gym_id: &str, client_id: &str) {
        if let Some(members) = self
            .gyms
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_mut(gym_id)
        {
            members.remove(client_id);
        }
    }
}

#[async_trait]
impl MembershipDirectory for InMemoryMembership {
    async fn list_client_ids(&self, gym_id: &str) -> Result<Vec<String>> {
        let gyms = self
            .gyms
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        Ok(gyms
            .get(gym_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }
}

/// Membership directory backed by the shared `gym_memberships` table.
#[derive(Debug, Clone)]
pub struct SqliteMembershipDirectory {
    pool: SqlitePool,
}

impl SqliteMembershipDirectory {
    /// Wrap an existing pool. The directory schema must already be applied.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the directory database at `path` and migrate it.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| ScheduleError::Database {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| ScheduleError::Database {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {:?}: {}", path, e),
            })?;

        migrations::run_directory(&pool).await?;

        info!(path = ?path, "Membership directory ready");
        Ok(Self { pool })
    }

    /// Add a client to a gym. Joining twice is a no-op.
    pub async fn join_gym(&self, gym_id: &str, client_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO gym_memberships (gym_id, client_id)
            VALUES (?, ?)
            ON CONFLICT (gym_id, client_id) DO NOTHING
            "#,
        )
        .bind(gym_id)
        .bind(client_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a client from a gym. Returns false if they were not a member.
    pub async fn leave_gym(&self, gym_id: &str, client_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM gym_memberships WHERE gym_id = ? AND client_id = ?")
            .bind(gym_id)
            .bind(client_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MembershipDirectory for SqliteMembershipDirectory {
    async fn list_client_ids(&self, gym_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT client_id FROM gym_memberships
            WHERE gym_id = ?
            ORDER BY client_id ASC
            "#,
        )
        .bind(gym_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ScheduleError::Membership {
            gym_id: gym_id.to_string(),
            reason: e.to_string(),
        })?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_roster() {
        let directory = InMemoryMembership::new();
        directory.join("g1", "c2");
        directory.join("g1", "c1");
        directory.join("g1", "c1");
        directory.join("g2", "c3");

        assert_eq!(directory.list_client_ids("g1").await.unwrap(), vec!["c1", "c2"]);

        directory.leave("g1", "c1");
        assert_eq!(directory.list_client_ids("g1").await.unwrap(), vec!["c2"]);
        assert!(directory.list_client_ids("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_roster() {
        let dir = TempDir::new().unwrap();
        let directory = SqliteMembershipDirectory::from_path(dir.path().join("nested/directory.db"))
            .await
            .expect("open directory");

        directory.join_gym("g1", "c2").await.unwrap();
        directory.join_gym("g1", "c1").await.unwrap();
        directory.join_gym("g1", "c1").await.unwrap();
        directory.join_gym("g2", "c9").await.unwrap();

        assert_eq!(directory.list_client_ids("g1").await.unwrap(), vec!["c1", "c2"]);

        assert!(directory.leave_gym("g1", "c2").await.unwrap());
        assert!(!directory.leave_gym("g1", "c2").await.unwrap());
        assert_eq!(directory.list_client_ids("g1").await.unwrap(), vec!["c1"]);
    }
}
