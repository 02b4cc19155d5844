// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database migrations for gymflow-core.
//!
//! Two schemas are embedded:
//!
//! - the **partition** schema, applied to every tenant partition on open. Every
//!   entity table is provisioned regardless of the tenant kind.
//! - the **directory** schema, applied to the shared membership database.
//!
//! Applied versions are recorded in each database's `_sqlx_migrations` table,
//! so re-running a migrator on an up-to-date database is a no-op.

use sqlx::SqlitePool;
use sqlx::migrate::MigrateError;

/// Migrator for the per-tenant partition schema.
pub static PARTITION: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/partition");

/// Migrator for the shared membership directory schema.
pub static DIRECTORY: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/directory");

/// Apply all pending partition migrations.
pub async fn run_partition(pool: &SqlitePool) -> Result<(), MigrateError> {
    PARTITION.run(pool).await
}

/// Apply all pending directory migrations.
pub async fn run_directory(pool: &SqlitePool) -> Result<(), MigrateError> {
    DIRECTORY.run(pool).await
}

/// Latest partition schema version embedded in this build.
pub fn latest_partition_version() -> i64 {
    PARTITION
        .iter()
        .map(|migration| migration.version)
        .max()
        .unwrap_or(0)
}
