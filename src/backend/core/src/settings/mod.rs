//! Routing and worker settings.
//!
//! The [`ConfigStore`] owns both documents. Readers take immutable
//! snapshots; writers go through `patch_*`, which merges, validates and
//! swaps the snapshot atomically, so a reader never observes a partially
//! applied patch.

pub mod patch;
pub mod store;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;
use crate::routing::RoutingConfig;

pub use patch::{EscalationPatch, RoutingPatch, WorkerPatch};
pub use store::{ConfigStore, Versioned};

/// Allowed range for `max_concurrent_jobs`.
pub const CONCURRENCY_RANGE: std::ops::RangeInclusive<usize> = 1..=5;

/// Allowed range, in seconds, for the poll and heartbeat intervals.
pub const INTERVAL_RANGE_SECS: std::ops::RangeInclusive<u64> = 1..=3600;

/// Lease length as a multiple of the heartbeat interval.
pub const LEASE_HEARTBEAT_MULTIPLIER: u32 = 3;

/// Worker pool settings. Read once when the pool starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of execution slots
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Idle slot polling cadence
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    /// Lease renewal cadence while an attempt runs
    #[serde(default = "default_heartbeat_interval_seconds")]
    pub heartbeat_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            poll_interval_seconds: default_poll_interval_seconds(),
            heartbeat_interval_seconds: default_heartbeat_interval_seconds(),
        }
    }
}

fn default_max_concurrent_jobs() -> usize { 3 }
fn default_poll_interval_seconds() -> u64 { 5 }
fn default_heartbeat_interval_seconds() -> u64 { 60 }

impl WorkerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !CONCURRENCY_RANGE.contains(&self.max_concurrent_jobs) {
            return Err(ConfigError::out_of_range(
                "worker.max_concurrent_jobs",
                self.max_concurrent_jobs,
                format!("{}..={}", CONCURRENCY_RANGE.start(), CONCURRENCY_RANGE.end()),
            ));
        }
        check_interval("worker.poll_interval_seconds", self.poll_interval_seconds)?;
        check_interval(
            "worker.heartbeat_interval_seconds",
            self.heartbeat_interval_seconds,
        )?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    /// Lease granted on claim and renewed on every heartbeat.
    pub fn lease_duration(&self) -> Duration {
        self.heartbeat_interval()
            .checked_mul(LEASE_HEARTBEAT_MULTIPLIER)
            .unwrap_or(Duration::MAX)
    }
}

fn check_interval(field: &str, secs: u64) -> Result<(), ConfigError> {
    if INTERVAL_RANGE_SECS.contains(&secs) {
        return Ok(());
    }
    Err(ConfigError::out_of_range(
        field,
        secs,
        format!("{}..={}", INTERVAL_RANGE_SECS.start(), INTERVAL_RANGE_SECS.end()),
    ))
}

/// The persisted settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.routing.validate()?;
        self.worker.validate()
    }
}
