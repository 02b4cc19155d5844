// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tenant partitions.
//!
//! Every trainer and every client owns a dedicated SQLite file. Nothing joins
//! across those files: an operation that spans tenants is a loop of independent
//! single-partition operations, each with its own outcome.
//!
//! The file location is a pure function of the tenant (see [`locator`]), so the
//! same tenant always resolves to the same file.

mod registry;

pub use self::registry::{
    DEFAULT_MAX_OPEN_PARTITIONS, PartitionHandle, PartitionOptions, PartitionRegistry,
};

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, ScheduleError};

const MAX_SLUG_LEN: usize = 48;

/// Which side of the gym a tenant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantKind {
    /// A trainer who owns courses.
    Trainer,
    /// A client enrolled in a gym.
    Client,
}

impl TenantKind {
    /// Stable lowercase name stored in partitions and used in locators.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trainer => "trainer",
            Self::Client => "client",
        }
    }

    fn dir_name(&self) -> &'static str {
        match self {
            Self::Trainer => "trainers",
            Self::Client => "clients",
        }
    }
}

impl fmt::Display for TenantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TenantKind {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "trainer" => Ok(Self::Trainer),
            "client" => Ok(Self::Client),
            other => Err(ScheduleError::Validation {
                field: "tenant_kind".to_string(),
                message: format!("unknown tenant kind '{}'", other),
            }),
        }
    }
}

/// A tenant identity: kind plus id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantRef {
    /// Trainer or client.
    pub kind: TenantKind,
    /// Identifier assigned by the profile layer.
    pub id: String,
}

impl TenantRef {
    /// Build a tenant reference.
    pub fn new(kind: TenantKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Shorthand for a trainer tenant.
    pub fn trainer(id: impl Into<String>) -> Self {
        Self::new(TenantKind::Trainer, id)
    }

    /// Shorthand for a client tenant.
    pub fn client(id: impl Into<String>) -> Self {
        Self::new(TenantKind::Client, id)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ScheduleError::Validation {
                field: "tenant_id".to_string(),
                message: format!("{} id must not be empty", self.kind),
            });
        }
        Ok(())
    }
}

impl fmt::Display for TenantRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Derive the on-disk location of a tenant's partition.
///
/// Layout: `<root>/<kind>s/<slug>-<hash>.db`. The slug keeps the file name
/// readable; the hash covers the raw id so ids that slug identically still get
/// distinct files.
pub fn locator(root: &Path, tenant: &TenantRef) -> PathBuf {
    let slug: String = tenant
        .id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_SLUG_LEN)
        .collect();

    let digest = Sha256::digest(format!("{}:{}", tenant.kind, tenant.id).as_bytes());
    let hash: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();

    root.join(tenant.kind.dir_name())
        .join(format!("{}-{}.db", slug, hash))
}
