// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for gymflow-core.
//!
//! Every fallible operation in the crate returns [`ScheduleError`]. Each variant
//! carries a stable machine-readable code (see [`ScheduleError::error_code`]) so
//! the course CRUD layer can map failures onto its own responses.

use thiserror::Error;

use crate::partition::TenantRef;

/// Result type using ScheduleError
pub type Result<T> = std::result::Result<T, ScheduleError>;

/// Errors raised by the partition router, the occurrence calculator and the
/// fan-out/regeneration passes.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ScheduleError {
    /// The tenant's partition could not be opened, created or migrated.
    #[error("Partition for {tenant} is unavailable: {reason}")]
    PartitionUnavailable {
        /// The tenant whose partition failed.
        tenant: TenantRef,
        /// Why the partition could not be used.
        reason: String,
    },

    /// The weekday set or lookahead window is malformed.
    #[error("Cannot compute occurrences: {message}")]
    OccurrenceComputation {
        /// What was wrong with the input.
        message: String,
    },

    /// A course record failed validation before any write happened.
    #[error("Invalid course field '{field}': {message}")]
    InvalidCourse {
        /// The offending course field.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Input validation failed.
    #[error("Validation error for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// The membership directory could not produce a roster.
    #[error("Membership for gym '{gym_id}' is unavailable: {reason}")]
    Membership {
        /// Gym whose roster was requested.
        gym_id: String,
        /// Underlying failure.
        reason: String,
    },

    /// One or more client partitions could not be updated.
    #[error("Failed to update {} client partition(s): {}", failed.len(), join_tenants(failed))]
    RegenerationPartialFailure {
        /// Tenants whose partitions were skipped.
        failed: Vec<TenantRef>,
    },

    /// A requested record does not exist.
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing record.
        what: String,
    },

    /// Database operation failed.
    #[error("Database error during '{operation}': {details}")]
    Database {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl ScheduleError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::PartitionUnavailable { .. } => "PARTITION_UNAVAILABLE",
            Self::OccurrenceComputation { .. } => "OCCURRENCE_COMPUTATION",
            Self::InvalidCourse { .. } => "INVALID_COURSE",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Membership { .. } => "MEMBERSHIP_UNAVAILABLE",
            Self::RegenerationPartialFailure { .. } => "REGENERATION_PARTIAL_FAILURE",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Database { .. } => "DATABASE_ERROR",
        }
    }

    pub(crate) fn invalid_course(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidCourse {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn database(operation: &str, err: impl std::fmt::Display) -> Self {
        Self::Database {
            operation: operation.to_string(),
            details: err.to_string(),
        }
    }
}

fn join_tenants(tenants: &[TenantRef]) -> String {
    tenants
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<sqlx::Error> for ScheduleError {
    fn from(err: sqlx::Error) -> Self {
        ScheduleError::database("query", err)
    }
}

impl From<sqlx::migrate::MigrateError> for ScheduleError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        ScheduleError::database("migrate", err)
    }
}
