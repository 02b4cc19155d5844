// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Partition registry: resolves tenants to open, migrated SQLite pools.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use super::{TenantKind, TenantRef, locator};
use crate::config::Config;
use crate::error::{Result, ScheduleError};
use crate::migrations;
use crate::schedule::ScheduleStore;

/// Default cap on partitions kept open by one registry.
pub const DEFAULT_MAX_OPEN_PARTITIONS: usize = 64;

/// Connection settings applied to every partition.
#[derive(Debug, Clone)]
pub struct PartitionOptions {
    /// Pool size per partition. One keeps writes within a partition serialized.
    pub max_connections: u32,
    /// SQLite busy timeout.
    pub busy_timeout: Duration,
    /// Partitions kept open at once. Idle partitions beyond this are closed,
    /// least recently used first. Partitions with live handles are never closed.
    pub max_open_partitions: usize,
    /// Idle connections are closed after this long.
    pub idle_timeout: Duration,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            max_connections: 1,
            busy_timeout: Duration::from_secs(5),
            max_open_partitions: DEFAULT_MAX_OPEN_PARTITIONS,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

struct Slot {
    cell: Arc<OnceCell<PartitionHandle>>,
    last_used: u64,
}

#[derive(Default)]
struct Slots {
    entries: HashMap<TenantRef, Slot>,
    clock: u64,
}

/// Routes tenants to their isolated partitions.
///
/// Partitions are opened lazily and cached per tenant. Concurrent first access
/// to the same tenant opens and migrates the file exactly once. At most
/// [`PartitionOptions::max_open_partitions`] idle partitions stay open.
pub struct PartitionRegistry {
    root: PathBuf,
    options: PartitionOptions,
    partitions: Mutex<Slots>,
}

impl std::fmt::Debug for PartitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionRegistry")
            .field("root", &self.root)
            .field("options", &self.options)
            .field("open_partitions", &self.open_partitions())
            .finish()
    }
}

impl PartitionRegistry {
    /// Create a registry rooted at `root` with default options.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_options(root, PartitionOptions::default())
    }

    /// Create a registry rooted at `root`.
    pub fn with_options(root: impl Into<PathBuf>, options: PartitionOptions) -> Self {
        Self {
            root: root.into(),
            options: PartitionOptions {
                max_open_partitions: options.max_open_partitions.max(1),
                ..options
            },
            partitions: Mutex::new(Slots::default()),
        }
    }

    /// Create a registry from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::with_options(
            config.data_dir.clone(),
            PartitionOptions {
                max_connections: config.partition_max_connections,
                busy_timeout: config.busy_timeout,
                max_open_partitions: config.max_open_partitions,
                ..PartitionOptions::default()
            },
        )
    }

    /// Root directory holding all partitions.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the partition for `tenant` lives (or will live).
    pub fn locator(&self, tenant: &TenantRef) -> PathBuf {
        locator(&self.root, tenant)
    }

    /// Resolve a tenant to its partition, creating and migrating it on first use.
    pub async fn resolve(&self, kind: TenantKind, tenant_id: &str) -> Result<PartitionHandle> {
        self.resolve_tenant(&TenantRef::new(kind, tenant_id)).await
    }

    /// Resolve a trainer partition.
    pub async fn trainer(&self, trainer_id: &str) -> Result<PartitionHandle> {
        self.resolve(TenantKind::Trainer, trainer_id).await
    }

    /// Resolve a client partition.
    pub async fn client(&self, client_id: &str) -> Result<PartitionHandle> {
        self.resolve(TenantKind::Client, client_id).await
    }

    /// Resolve a tenant to its partition, creating and migrating it on first use.
    ///
    /// Failures are returned as [`ScheduleError::PartitionUnavailable`] and are
    /// not retried here. A later call attempts the open again.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn resolve_tenant(&self, tenant: &TenantRef) -> Result<PartitionHandle> {
        tenant.validate()?;

        let cell = {
            let mut slots = self.lock_partitions();
            slots.clock += 1;
            let now = slots.clock;
            let slot = slots.entries.entry(tenant.clone()).or_insert_with(|| Slot {
                cell: Arc::default(),
                last_used: now,
            });
            slot.last_used = now;
            slot.cell.clone()
        };

        let handle = cell.get_or_try_init(|| self.open(tenant)).await?.clone();
        drop(cell);

        self.evict_idle().await;
        Ok(handle)
    }

    /// Number of partitions currently open in this registry.
    pub fn open_partitions(&self) -> usize {
        self.lock_partitions()
            .entries
            .values()
            .filter(|slot| slot.cell.initialized())
            .count()
    }

    /// Close every open partition pool and forget the cached handles.
    pub async fn close_all(&self) {
        let cells: Vec<_> = self
            .lock_partitions()
            .entries
            .drain()
            .map(|(_, slot)| slot.cell)
            .collect();

        for cell in cells {
            if let Some(handle) = cell.get() {
                handle.pool.close().await;
            }
        }

        debug!("Closed all tenant partitions");
    }

    /// Close least recently used partitions nobody holds until the cap is met.
    async fn evict_idle(&self) {
        let evicted: Vec<PartitionHandle> = {
            let mut slots = self.lock_partitions();

            // Failed opens leave empty cells behind
            slots
                .entries
                .retain(|_, slot| slot.cell.initialized() || Arc::strong_count(&slot.cell) > 1);

            let open = slots.entries.len();
            if open <= self.options.max_open_partitions {
                return;
            }

            let mut idle: Vec<(u64, TenantRef)> = slots
                .entries
                .iter()
                .filter(|(_, slot)| {
                    Arc::strong_count(&slot.cell) == 1
                        && slot.cell.get().is_some_and(PartitionHandle::is_idle)
                })
                .map(|(tenant, slot)| (slot.last_used, tenant.clone()))
                .collect();
            idle.sort();

            idle.into_iter()
                .take(open - self.options.max_open_partitions)
                .filter_map(|(_, tenant)| slots.entries.remove(&tenant))
                .filter_map(|slot| slot.cell.get().cloned())
                .collect()
        };

        for handle in evicted {
            debug!(tenant = %handle.tenant, "Closing idle tenant partition");
            handle.pool.close().await;
        }
    }

    fn lock_partitions(&self) -> MutexGuard<'_, Slots> {
        self.partitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn open(&self, tenant: &TenantRef) -> Result<PartitionHandle> {
        let path = self.locator(tenant);
        let unavailable = |reason: String| ScheduleError::PartitionUnavailable {
            tenant: tenant.clone(),
            reason,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| unavailable(format!("failed to create {:?}: {}", parent, e)))?;
        }

        let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);

        let connect_options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(self.options.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(self.options.max_connections)
            .min_connections(0)
            .idle_timeout(self.options.idle_timeout)
            .connect_with(connect_options)
            .await
            .map_err(|e| unavailable(format!("failed to open {:?}: {}", path, e)))?;

        migrations::run_partition(&pool)
            .await
            .map_err(|e| unavailable(format!("failed to migrate {:?}: {}", path, e)))?;

        if let Err(e) = claim_owner(&pool, tenant).await {
            pool.close().await;
            warn!(path = ?path, error = %e, "Refusing tenant partition");
            return Err(e);
        }

        if existed {
            debug!(path = ?path, "Opened tenant partition");
        } else {
            info!(path = ?path, "Created tenant partition");
        }

        Ok(PartitionHandle {
            tenant: tenant.clone(),
            path,
            pool,
            lease: Arc::new(()),
        })
    }
}

/// Record the owner on first open and verify it on every later open.
async fn claim_owner(pool: &SqlitePool, tenant: &TenantRef) -> Result<()> {
    let unavailable = |e: sqlx::Error| ScheduleError::PartitionUnavailable {
        tenant: tenant.clone(),
        reason: format!("failed to check partition owner: {}", e),
    };

    sqlx::query(
        r#"
        INSERT INTO partition_owner (singleton, tenant_kind, tenant_id)
        VALUES (1, ?, ?)
        ON CONFLICT (singleton) DO NOTHING
        "#,
    )
    .bind(tenant.kind.as_str())
    .bind(&tenant.id)
    .execute(pool)
    .await
    .map_err(unavailable)?;

    let (kind, id): (String, String) = sqlx::query_as(
        r#"
        SELECT tenant_kind, tenant_id FROM partition_owner WHERE singleton = 1
        "#,
    )
    .fetch_one(pool)
    .await
    .map_err(unavailable)?;

    if kind != tenant.kind.as_str() || id != tenant.id {
        return Err(ScheduleError::PartitionUnavailable {
            tenant: tenant.clone(),
            reason: format!("partition file belongs to {}:{}", kind, id),
        });
    }

    Ok(())
}

/// Live access to one tenant's partition.
///
/// Cloning is cheap and shares the underlying pool. The registry does not
/// close a partition while any clone of its handle, or any [`ScheduleStore`]
/// taken from one, is alive.
#[derive(Debug, Clone)]
pub struct PartitionHandle {
    tenant: TenantRef,
    path: PathBuf,
    pool: SqlitePool,
    lease: Arc<()>,
}

impl PartitionHandle {
    fn is_idle(&self) -> bool {
        Arc::strong_count(&self.lease) == 1
    }

    /// The tenant owning this partition.
    pub fn tenant(&self) -> &TenantRef {
        &self.tenant
    }

    /// File backing this partition.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw pool, for CRUD layers that own other partition tables.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Schedule entry operations on this partition.
    pub fn schedule(&self) -> ScheduleStore {
        ScheduleStore::leased(self.pool.clone(), self.lease.clone())
    }

    /// Highest migration version applied to this partition.
    pub async fn schema_version(&self) -> Result<i64> {
        let (version,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1")
                .fetch_one(&self.pool)
                .await?;

        Ok(version.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_resolve_creates_and_migrates_partition() {
        let dir = TempDir::new().unwrap();
        let registry = PartitionRegistry::new(dir.path());

        let handle = registry.trainer("t1").await.expect("resolve trainer");

        assert!(handle.path().exists());
        assert_eq!(handle.tenant(), &TenantRef::trainer("t1"));
        assert_eq!(
            handle.schema_version().await.unwrap(),
            migrations::latest_partition_version()
        );
        assert_eq!(registry.open_partitions(), 1);
    }

    #[tokio::test]
    async fn test_resolve_twice_returns_same_partition() {
        let dir = TempDir::new().unwrap();
        let registry = PartitionRegistry::new(dir.path());

        let first = registry.client("c1").await.unwrap();
        let second = registry.client("c1").await.unwrap();

        assert_eq!(first.path(), second.path());
        assert_eq!(registry.open_partitions(), 1);
    }

    #[tokio::test]
    async fn test_reopen_after_close_keeps_data() {
        let dir = TempDir::new().unwrap();
        let registry = PartitionRegistry::new(dir.path());

        let handle = registry.client("c1").await.unwrap();
        sqlx::query("INSERT INTO diet_logs (date, meal) VALUES ('2024-01-01', 'oats')")
            .execute(handle.pool())
            .await
            .unwrap();
        registry.close_all().await;
        assert_eq!(registry.open_partitions(), 0);

        let reopened = registry.client("c1").await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM diet_logs")
            .fetch_one(reopened.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_every_partition_gets_full_schema() {
        let dir = TempDir::new().unwrap();
        let registry = PartitionRegistry::new(dir.path());

        for handle in [
            registry.trainer("t1").await.unwrap(),
            registry.client("c1").await.unwrap(),
        ] {
            let tables: Vec<(String,)> = sqlx::query_as(
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
            )
            .fetch_all(handle.pool())
            .await
            .unwrap();
            let tables: Vec<_> = tables.into_iter().map(|(name,)| name).collect();

            for expected in ["diet_logs", "partition_owner", "schedule_entries", "workout_logs"] {
                assert!(
                    tables.iter().any(|t| t == expected),
                    "{} missing in {}",
                    expected,
                    handle.tenant()
                );
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_access_opens_once() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(PartitionRegistry::new(dir.path()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.client("busy").await.map(|h| h.path().to_owned()) })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().expect("resolve should succeed");
        }

        assert_eq!(registry.open_partitions(), 1);
    }

    #[tokio::test]
    async fn test_empty_tenant_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = PartitionRegistry::new(dir.path());

        let err = registry.client("").await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert_eq!(registry.open_partitions(), 0);
    }

    #[tokio::test]
    async fn test_unwritable_locator_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let registry = PartitionRegistry::new(dir.path());
        let tenant = TenantRef::client("blocked");

        // A directory where the database file should be
        std::fs::create_dir_all(registry.locator(&tenant)).unwrap();

        let err = registry.resolve_tenant(&tenant).await.unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::PartitionUnavailable { ref tenant, .. } if tenant.id == "blocked"
        ));
    }

    #[tokio::test]
    async fn test_foreign_partition_file_is_refused() {
        let dir = TempDir::new().unwrap();
        let registry = PartitionRegistry::new(dir.path());

        let trainer = registry.trainer("t1").await.unwrap();
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(trainer.pool())
            .await
            .unwrap();
        let source = trainer.path().to_owned();
        registry.close_all().await;

        let impostor = TenantRef::client("c1");
        let target = registry.locator(&impostor);
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::copy(&source, &target).unwrap();

        let err = registry.resolve_tenant(&impostor).await.unwrap_err();
        assert_eq!(err.error_code(), "PARTITION_UNAVAILABLE");
        assert!(err.to_string().contains("trainer:t1"));
    }

    fn capped(dir: &TempDir, max_open_partitions: usize) -> PartitionRegistry {
        PartitionRegistry::with_options(
            dir.path(),
            PartitionOptions {
                max_open_partitions,
                ..PartitionOptions::default()
            },
        )
    }

    #[tokio::test]
    async fn test_idle_partitions_are_closed_beyond_cap() {
        let dir = TempDir::new().unwrap();
        let registry = capped(&dir, 2);

        let first = registry.client("c0").await.unwrap();
        sqlx::query("INSERT INTO diet_logs (date, meal) VALUES ('2024-01-01', 'eggs')")
            .execute(first.pool())
            .await
            .unwrap();
        drop(first);

        for i in 1..10 {
            registry.client(&format!("c{}", i)).await.unwrap();
            assert!(registry.open_partitions() <= 2);
        }

        // Evicted partitions reopen with their data
        let reopened = registry.client("c0").await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM diet_logs")
            .fetch_one(reopened.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_held_partitions_stay_open() {
        let dir = TempDir::new().unwrap();
        let registry = capped(&dir, 1);

        let held = registry.trainer("t1").await.unwrap();
        let store = registry.client("c1").await.unwrap().schedule();
        for i in 2..6 {
            registry.client(&format!("c{}", i)).await.unwrap();
        }

        assert!(!held.pool().is_closed());
        assert!(store.list_for_course("none").await.unwrap().is_empty());
        assert_eq!(held.schema_version().await.unwrap(), migrations::latest_partition_version());
    }

    #[tokio::test]
    async fn test_least_recently_used_partition_is_closed_first() {
        let dir = TempDir::new().unwrap();
        let registry = capped(&dir, 2);

        let a = registry.client("a").await.unwrap();
        let b = registry.client("b").await.unwrap();
        let (a_pool, b_pool) = (a.pool().clone(), b.pool().clone());
        drop((a, b));

        // Touch "a" so "b" becomes the oldest
        drop(registry.client("a").await.unwrap());
        drop(registry.client("c").await.unwrap());

        assert!(b_pool.is_closed());
        assert!(!a_pool.is_closed());
        assert_eq!(registry.open_partitions(), 2);
    }

    #[tokio::test]
    async fn test_broken_owner_table_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let registry = PartitionRegistry::new(dir.path());

        let handle = registry.client("c1").await.unwrap();
        sqlx::query("DROP TABLE partition_owner")
            .execute(handle.pool())
            .await
            .unwrap();
        sqlx::query("CREATE TABLE partition_owner (unrelated TEXT)")
            .execute(handle.pool())
            .await
            .unwrap();
        drop(handle);
        registry.close_all().await;

        let err = registry.client("c1").await.unwrap_err();
        assert_eq!(err.error_code(), "PARTITION_UNAVAILABLE");
        assert!(err.to_string().contains("partition owner"));
    }
}
