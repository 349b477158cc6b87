//! Job system: queue, leases, and the worker pool that runs attempts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  submit   ┌──────────────┐  claim/lease  ┌──────────────┐
//! │   Producer   │──────────▶│   JobQueue   │◀─────────────▶│  WorkerPool  │
//! └──────────────┘           │ (priority +  │   heartbeat   │  (N slots)   │
//!                            │  FIFO, lease │   complete    └──────┬───────┘
//!                            │  recovery)   │   fail/requeue       │ execute(tier)
//!                            └──────┬───────┘                      ▼
//!                                   │ snapshot            ┌──────────────────┐
//!                                   ▼                     │ ExecutionBackend │
//!                            ┌──────────────┐             └──────────────────┘
//!                            │ QueueBackend │
//!                            └──────────────┘
//! ```
//!
//! A slot claims a job, picks its tier (fresh jobs are routed from the
//! current config, retried ones keep theirs), runs the backend under the
//! escalation timeout while renewing the lease, then completes, fails, or
//! requeues the job according to the escalation decision.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tierflow_core::execution::{HttpBackendConfig, HttpExecutionBackend};
//! use tierflow_core::jobs::{JobQueue, WorkerPool};
//! use tierflow_core::settings::ConfigStore;
//!
//! # async fn run() -> tierflow_core::Result<()> {
//! let store = Arc::new(ConfigStore::in_memory());
//! let queue = Arc::new(JobQueue::in_memory());
//! let backend = Arc::new(HttpExecutionBackend::new(HttpBackendConfig::default())?);
//!
//! let pool = WorkerPool::new(store, queue, backend);
//! let handle = pool.start()?;
//! let job_id = pool.submit("analyst", 12.5).await?;
//! println!("submitted {}", job_id);
//!
//! handle.shutdown_and_join().await;
//! # Ok(())
//! # }
//! ```

mod attempt;
pub mod estimate;
pub mod job;
pub mod queue;
pub mod snapshot;
pub mod state;
pub mod worker;

pub use estimate::{
    estimate_duration_minutes, transcript_metrics, TranscriptMetrics, DEFAULT_WORDS_PER_MINUTE,
    LONG_FORM_THRESHOLD_MINUTES,
};
pub use job::{Job, JobEvent, JobEventKind, JobId, JobPriority, JobStatus, Lease, NewJob};
pub use queue::{Claim, FileQueueBackend, InMemoryQueueBackend, JobQueue, QueueBackend, QueueConfig};
pub use state::{QueueSnapshot, QueueState, QueueStats, ReapSummary};
pub use worker::{WorkerHandle, WorkerPool, WorkerStats};
