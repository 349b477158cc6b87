#![allow(clippy::result_large_err)]
//! # Tierflow Core
//!
//! Tier routing and escalation engine for staged content-processing jobs.
//!
//! ## Architecture
//!
//! - **Tier Table**: ordered capability levels, cheapest first
//! - **Routing Resolver**: stage base tier combined with duration thresholds
//! - **Escalation Policy**: pure retry / escalate / give-up decision per attempt
//! - **Configuration Store**: copy-on-write routing and worker settings with validated patches
//! - **Job Queue**: priority FIFO with leases, heartbeats and crash recovery
//! - **Worker Pool**: bounded slots that run attempts against an execution backend
//! - **Telemetry**: structured logging and metrics

pub mod config;
pub mod error;
pub mod execution;
pub mod jobs;
pub mod routing;
pub mod settings;
pub mod telemetry;

pub use error::{ConfigError, ErrorCode, ErrorSeverity, QueueError, Result, TierflowError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::error::{ConfigError, ErrorCode, QueueError, Result, TierflowError};
    pub use crate::execution::{
        ExecutionBackend, ExecutionOutcome, ExecutionRequest, HttpBackendConfig,
        HttpExecutionBackend,
    };
    pub use crate::jobs::{
        FileQueueBackend, InMemoryQueueBackend, Job, JobId, JobPriority, JobQueue, JobStatus,
        NewJob, QueueBackend, QueueConfig, WorkerHandle, WorkerPool, WorkerStats,
    };
    pub use crate::routing::{
        decide, explain, resolve_tier, Decision, DurationThreshold, EscalationPolicy,
        FailureKind, GiveUpReason, RoutingConfig, Tier, TierTable,
    };
    pub use crate::settings::{
        ConfigStore, EscalationPatch, RoutingPatch, Settings, WorkerConfig, WorkerPatch,
    };
}
