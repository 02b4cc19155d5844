// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::recurrence::MAX_LOOKAHEAD_WEEKS;

/// Default number of weeks materialized by a course synchronization.
pub const DEFAULT_LOOKAHEAD_WEEKS: i32 = 4;

/// gymflow configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory holding one SQLite file per tenant partition
    pub data_dir: PathBuf,
    /// SQLite file holding the gym membership directory
    pub directory_path: PathBuf,
    /// Weeks of course occurrences written ahead of today
    pub lookahead_weeks: i32,
    /// Maximum client partitions written concurrently during a fan-out
    pub fanout_concurrency: usize,
    /// Connection pool size per partition
    pub partition_max_connections: u32,
    /// How long SQLite waits on a locked partition before failing
    pub busy_timeout: Duration,
    /// Idle partitions kept open at once
    pub max_open_partitions: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from(".data");
        Self {
            directory_path: data_dir.join("directory.db"),
            data_dir,
            lookahead_weeks: DEFAULT_LOOKAHEAD_WEEKS,
            fanout_concurrency: 8,
            partition_max_connections: 1,
            busy_timeout: Duration::from_millis(5000),
            max_open_partitions: 64,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `GYMFLOW_DATA_DIR`: partition root (default: `.data`)
    /// - `GYMFLOW_DIRECTORY_PATH`: membership database (default: `<data_dir>/directory.db`)
    /// - `GYMFLOW_LOOKAHEAD_WEEKS`: weeks to materialize (default: 4)
    /// - `GYMFLOW_FANOUT_CONCURRENCY`: concurrent client partitions (default: 8)
    /// - `GYMFLOW_PARTITION_MAX_CONNECTIONS`: pool size per partition (default: 1)
    /// - `GYMFLOW_BUSY_TIMEOUT_MS`: SQLite busy timeout (default: 5000)
    /// - `GYMFLOW_MAX_OPEN_PARTITIONS`: idle partitions kept open (default: 64)
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir =
            PathBuf::from(std::env::var("GYMFLOW_DATA_DIR").unwrap_or_else(|_| ".data".to_string()));

        let directory_path = std::env::var("GYMFLOW_DIRECTORY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("directory.db"));

        let lookahead_weeks: i32 = std::env::var("GYMFLOW_LOOKAHEAD_WEEKS")
            .unwrap_or_else(|_| DEFAULT_LOOKAHEAD_WEEKS.to_string())
            .parse()
            .ok()
            .filter(|weeks| (0..=MAX_LOOKAHEAD_WEEKS).contains(weeks))
            .ok_or(ConfigError::Invalid(
                "GYMFLOW_LOOKAHEAD_WEEKS",
                "must be an integer between 0 and 520",
            ))?;

        let fanout_concurrency: usize = std::env::var("GYMFLOW_FANOUT_CONCURRENCY")
            .unwrap_or_else(|_| "8".to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "GYMFLOW_FANOUT_CONCURRENCY",
                "must be a positive integer",
            ))?;

        let partition_max_connections: u32 = std::env::var("GYMFLOW_PARTITION_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "GYMFLOW_PARTITION_MAX_CONNECTIONS",
                "must be a positive integer",
            ))?;

        let busy_timeout_ms: u64 = std::env::var("GYMFLOW_BUSY_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("GYMFLOW_BUSY_TIMEOUT_MS", "must be a number of milliseconds")
            })?;

        let max_open_partitions: usize = std::env::var("GYMFLOW_MAX_OPEN_PARTITIONS")
            .unwrap_or_else(|_| "64".to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "GYMFLOW_MAX_OPEN_PARTITIONS",
                "must be a positive integer",
            ))?;

        Ok(Self {
            data_dir,
            directory_path,
            lookahead_weeks,
            fanout_concurrency,
            partition_max_connections,
            busy_timeout: Duration::from_millis(busy_timeout_ms),
            max_open_partitions,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
