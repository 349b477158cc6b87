//! Error handling for Tierflow Core.
//!
//! This module provides:
//! - Typed error enums for configuration and queue failures
//! - A crate-wide [`TierflowError`] wrapping every failure source
//! - Stable error codes for machine-readable diagnostics
//! - Severity-based logging with metrics integration
//!
//! # Usage
//!
//! ```rust,ignore
//! use tierflow_core::error::{ConfigError, Result};
//!
//! fn check(tier: usize, max_tier: usize) -> Result<()> {
//!     if tier > max_tier {
//!         return Err(ConfigError::TierOutOfRange { tier, max_tier }.into());
//!     }
//!     Ok(())
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, warn};

use crate::jobs::{JobId, JobStatus};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Tierflow operations.
pub type Result<T> = std::result::Result<T, TierflowError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Domain Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors raised while resolving tiers or validating routing/worker settings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The stage has no base tier configured.
    #[error("unknown stage '{stage}'")]
    UnknownStage { stage: String },

    /// A tier index does not exist in the tier table.
    #[error("tier {tier} is out of range (max tier is {max_tier})")]
    TierOutOfRange { tier: usize, max_tier: usize },

    /// A structural rule of the routing config was broken.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A numeric setting is outside its allowed range.
    #[error("{field} = {value} is outside the allowed range {allowed}")]
    OutOfRangeValue {
        field: String,
        value: String,
        allowed: String,
    },
}

impl ConfigError {
    pub(crate) fn out_of_range(
        field: impl Into<String>,
        value: impl fmt::Display,
        allowed: impl Into<String>,
    ) -> Self {
        Self::OutOfRangeValue {
            field: field.into(),
            value: value.to_string(),
            allowed: allowed.into(),
        }
    }
}

/// Errors raised by job queue operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    #[error("job {job_id} not found")]
    NotFound { job_id: JobId },

    /// The caller does not hold the current lease on the job.
    #[error("job {job_id} is not claimed by this lease")]
    NotClaimed { job_id: JobId },

    /// The caller's lease ran out; the job has been returned to the queue.
    #[error("lease on job {job_id} has expired")]
    LeaseExpired { job_id: JobId },

    #[error("queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("cannot {operation} job {job_id} in status {status}")]
    InvalidState {
        job_id: JobId,
        status: JobStatus,
        operation: &'static str,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by operators for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration Errors (1000-1099)
    UnknownStage,
    TierOutOfRange,
    InvariantViolation,
    OutOfRangeValue,

    // Queue Errors (2000-2099)
    JobNotFound,
    NotClaimed,
    LeaseExpired,
    QueueFull,
    InvalidStateTransition,

    // Storage Errors (3000-3099)
    StorageError,
    SerializationError,
    SettingsFormatError,

    // Execution Backend Errors (4000-4099)
    BackendError,

    // Internal Errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::UnknownStage => 1000,
            Self::TierOutOfRange => 1001,
            Self::InvariantViolation => 1002,
            Self::OutOfRangeValue => 1003,

            Self::JobNotFound => 2000,
            Self::NotClaimed => 2001,
            Self::LeaseExpired => 2002,
            Self::QueueFull => 2003,
            Self::InvalidStateTransition => 2004,

            Self::StorageError => 3000,
            Self::SerializationError => 3001,
            Self::SettingsFormatError => 3002,

            Self::BackendError => 4000,

            Self::InternalError => 9000,
        }
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "configuration",
            2000..=2099 => "queue",
            3000..=3099 => "storage",
            4000..=4099 => "backend",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors (bad input, rejected patches)
    Low,
    /// Expected operational races (lost leases, full queue)
    Medium,
    /// Infrastructure failures (disk, backend)
    High,
    /// Broken invariants inside the engine
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::UnknownStage
            | ErrorCode::TierOutOfRange
            | ErrorCode::InvariantViolation
            | ErrorCode::OutOfRangeValue
            | ErrorCode::JobNotFound
            | ErrorCode::InvalidStateTransition => Self::Low,

            ErrorCode::NotClaimed | ErrorCode::LeaseExpired | ErrorCode::QueueFull => Self::Medium,

            ErrorCode::StorageError
            | ErrorCode::SerializationError
            | ErrorCode::SettingsFormatError
            | ErrorCode::BackendError => Self::High,

            ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Tierflow Core.
#[derive(Error, Debug)]
pub enum TierflowError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to parse settings: {0}")]
    SettingsDecode(#[from] toml::de::Error),

    #[error("failed to encode settings: {0}")]
    SettingsEncode(#[from] toml::ser::Error),

    #[error("execution backend error: {0}")]
    Backend(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TierflowError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the stable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Config(e) => match e {
                ConfigError::UnknownStage { .. } => ErrorCode::UnknownStage,
                ConfigError::TierOutOfRange { .. } => ErrorCode::TierOutOfRange,
                ConfigError::InvariantViolation(_) => ErrorCode::InvariantViolation,
                ConfigError::OutOfRangeValue { .. } => ErrorCode::OutOfRangeValue,
            },
            Self::Queue(e) => match e {
                QueueError::NotFound { .. } => ErrorCode::JobNotFound,
                QueueError::NotClaimed { .. } => ErrorCode::NotClaimed,
                QueueError::LeaseExpired { .. } => ErrorCode::LeaseExpired,
                QueueError::QueueFull { .. } => ErrorCode::QueueFull,
                QueueError::InvalidState { .. } => ErrorCode::InvalidStateTransition,
            },
            Self::Storage { .. } => ErrorCode::StorageError,
            Self::Serialization(_) => ErrorCode::SerializationError,
            Self::SettingsDecode(_) | Self::SettingsEncode(_) => ErrorCode::SettingsFormatError,
            Self::Backend(_) => ErrorCode::BackendError,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code())
    }

    /// True when the caller no longer owns the job it was working on.
    pub fn is_lease_loss(&self) -> bool {
        matches!(
            self,
            Self::Queue(QueueError::NotClaimed { .. }) | Self::Queue(QueueError::LeaseExpired { .. })
        )
    }

    /// The configuration error, if this is one.
    pub fn as_config(&self) -> Option<&ConfigError> {
        match self {
            Self::Config(e) => Some(e),
            _ => None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity and count it.
    pub fn log(&self) {
        let code = self.code();
        let category = code.category();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    numeric_code = code.numeric_code(),
                    category = category,
                    error = %self,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    error = %self,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    error = %self,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    error = %self,
                    "Low severity error"
                );
            }
        }

        self.record_metrics();
    }

    fn record_metrics(&self) {
        let code = self.code();
        counter!(
            "tierflow_errors_total",
            "code" => code.to_string(),
            "category" => code.category().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
