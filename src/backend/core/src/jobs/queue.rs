//! Durable job queue with leases, priorities and crash recovery.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::job::{Job, JobEvent, JobId, JobStatus, Lease, NewJob};
use super::snapshot;
use super::state::{QueueSnapshot, QueueState, QueueStats, ReapSummary};
use crate::error::{QueueError, Result, TierflowError};
use crate::telemetry::metrics::JobMetrics;

/// Configuration for the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of pending jobs
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
    /// Lease expiries tolerated before a job is failed
    #[serde(default = "default_max_lease_recoveries")]
    pub max_lease_recoveries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_pending: default_max_pending(),
            max_lease_recoveries: default_max_lease_recoveries(),
        }
    }
}

fn default_max_pending() -> usize { 10_000 }
fn default_max_lease_recoveries() -> u32 { 3 }

/// A successful claim.
#[derive(Debug, Clone)]
pub struct Claim {
    pub lease: Lease,
    pub job: Job,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Backends
// ═══════════════════════════════════════════════════════════════════════════════

/// Storage for queue snapshots.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Load the last saved state, if any.
    async fn load(&self) -> Result<Option<QueueSnapshot>>;

    /// Persist the full state.
    async fn persist(&self, snapshot: QueueSnapshot) -> Result<()>;

    /// Whether `persist` does anything. Lets the queue skip building
    /// snapshots nobody stores.
    fn is_durable(&self) -> bool;
}

/// Keeps nothing; state lives only in the queue's memory.
#[derive(Debug, Default)]
pub struct InMemoryQueueBackend;

impl InMemoryQueueBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueueBackend {
    async fn load(&self) -> Result<Option<QueueSnapshot>> {
        Ok(None)
    }

    async fn persist(&self, _snapshot: QueueSnapshot) -> Result<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}

/// Persists the queue as a JSON snapshot file after every mutation.
#[derive(Debug, Clone)]
pub struct FileQueueBackend {
    path: PathBuf,
}

impl FileQueueBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl QueueBackend for FileQueueBackend {
    async fn load(&self) -> Result<Option<QueueSnapshot>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || snapshot::load(&path))
            .await
            .map_err(|e| TierflowError::internal(format!("snapshot load task failed: {}", e)))?
    }

    async fn persist(&self, snapshot: QueueSnapshot) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || snapshot::save(&path, &snapshot))
            .await
            .map_err(|e| TierflowError::internal(format!("snapshot save task failed: {}", e)))?
    }

    fn is_durable(&self) -> bool {
        true
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Queue
// ═══════════════════════════════════════════════════════════════════════════════

/// The main job queue.
///
/// Every operation runs under one lock, which is what makes claims
/// exclusive: two concurrent `claim_next` calls can never receive the same
/// job.
pub struct JobQueue {
    state: Mutex<QueueState>,
    backend: Arc<dyn QueueBackend>,
    config: QueueConfig,
}

impl JobQueue {
    /// Create an empty queue with the given backend.
    pub fn new(backend: Arc<dyn QueueBackend>, config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::new()),
            backend,
            config,
        }
    }

    /// Create a queue, restoring whatever the backend has saved.
    pub async fn open(backend: Arc<dyn QueueBackend>, config: QueueConfig) -> Result<Self> {
        let state = match backend.load().await? {
            Some(snapshot) => {
                let state = QueueState::from_snapshot(snapshot);
                let stats = state.stats();
                tracing::info!(
                    pending = stats.pending,
                    leased = stats.claimed + stats.running,
                    total = stats.total(),
                    "Restored job queue"
                );
                state
            }
            None => QueueState::new(),
        };
        Ok(Self {
            state: Mutex::new(state),
            backend,
            config,
        })
    }

    /// Create a new in-memory job queue.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryQueueBackend::new()), QueueConfig::default())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn persist(&self, state: &QueueState) {
        if !self.backend.is_durable() {
            return;
        }
        // The in-memory state stays authoritative; the next save catches up.
        if let Err(e) = self.backend.persist(state.snapshot()).await {
            e.log();
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Producer operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Enqueue a job.
    pub async fn enqueue(&self, new: NewJob) -> Result<JobId> {
        let mut state = self.state.lock().await;
        let stage = new.stage.clone();
        let job_id = state.enqueue(new, self.config.max_pending, Utc::now())?;
        self.persist(&state).await;

        JobMetrics::submitted(&stage);
        tracing::debug!(job_id = %job_id, stage = %stage, "Job enqueued");
        Ok(job_id)
    }

    /// Cancel a job that has not finished.
    pub async fn cancel(&self, job_id: JobId) -> Result<Job> {
        let mut state = self.state.lock().await;
        let job = state.cancel(job_id, Utc::now())?;
        self.persist(&state).await;

        JobMetrics::finished(JobStatus::Cancelled);
        tracing::info!(job_id = %job_id, stage = %job.stage, "Job cancelled");
        Ok(job)
    }

    /// Hold a pending job back from workers until it is resumed.
    pub async fn pause(&self, job_id: JobId) -> Result<Job> {
        let mut state = self.state.lock().await;
        let job = state.pause(job_id, Utc::now())?;
        self.persist(&state).await;

        tracing::info!(job_id = %job_id, stage = %job.stage, "Job paused");
        Ok(job)
    }

    /// Make a paused job claimable again.
    pub async fn resume(&self, job_id: JobId) -> Result<Job> {
        let mut state = self.state.lock().await;
        let job = state.resume(job_id, Utc::now())?;
        self.persist(&state).await;

        tracing::info!(job_id = %job_id, stage = %job.stage, "Job resumed");
        Ok(job)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Worker operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Claim the next job, leasing it for `lease_duration`.
    ///
    /// Lapsed leases are recovered first, so an abandoned job can be the one
    /// claimed.
    pub async fn claim_next(&self, lease_duration: Duration) -> Result<Option<Claim>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let recovered = state.reap_expired(self.config.max_lease_recoveries, now);
        let claimed = state.claim_next(lease_duration, self.config.max_lease_recoveries, now);

        if !recovered.is_empty() || claimed.is_some() {
            self.persist(&state).await;
        }
        self.report_recoveries(&recovered);

        let Some((lease, job)) = claimed else {
            return Ok(None);
        };

        tracing::debug!(
            job_id = %job.id,
            stage = %job.stage,
            tier = ?job.current_tier,
            expires_at = %lease.expires_at,
            "Job claimed"
        );
        Ok(Some(Claim { lease, job }))
    }

    /// Extend a lease. Returns the renewed lease.
    pub async fn heartbeat(&self, lease: &Lease, extend_by: Duration) -> Result<Lease> {
        let mut state = self.state.lock().await;
        let outcome = state.heartbeat(lease, extend_by, self.config.max_lease_recoveries, Utc::now());
        self.finish_lease_op(&state, lease, outcome).await
    }

    /// Mark the claimed job as running at `tier`.
    pub async fn start(&self, lease: &Lease, tier: usize) -> Result<Job> {
        let mut state = self.state.lock().await;
        let outcome = state.start(lease, tier, self.config.max_lease_recoveries, Utc::now());
        self.finish_lease_op(&state, lease, outcome).await
    }

    /// Finalize the job as succeeded.
    pub async fn complete(&self, lease: &Lease, result: serde_json::Value) -> Result<Job> {
        let mut state = self.state.lock().await;
        let outcome = state.complete(lease, result, self.config.max_lease_recoveries, Utc::now());
        let job = self.finish_lease_op(&state, lease, outcome).await?;
        JobMetrics::finished(JobStatus::Succeeded);
        Ok(job)
    }

    /// Finalize the job as failed.
    pub async fn fail(&self, lease: &Lease, error: impl Into<String>) -> Result<Job> {
        let mut state = self.state.lock().await;
        let outcome = state.fail(
            lease,
            error.into(),
            self.config.max_lease_recoveries,
            Utc::now(),
        );
        let job = self.finish_lease_op(&state, lease, outcome).await?;
        JobMetrics::finished(JobStatus::Failed);
        Ok(job)
    }

    /// Return the job to Pending with updated routing state.
    pub async fn requeue(&self, lease: &Lease, tier: usize, attempts_at_tier: u32) -> Result<Job> {
        let mut state = self.state.lock().await;
        let outcome = state.requeue(
            lease,
            tier,
            attempts_at_tier,
            self.config.max_lease_recoveries,
            Utc::now(),
        );
        self.finish_lease_op(&state, lease, outcome).await
    }

    async fn finish_lease_op<T>(
        &self,
        state: &QueueState,
        lease: &Lease,
        outcome: std::result::Result<T, QueueError>,
    ) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.persist(state).await;
                Ok(value)
            }
            Err(QueueError::LeaseExpired { job_id }) => {
                // The expired lease already moved the job; save that.
                self.persist(state).await;
                JobMetrics::lease_recovered();
                tracing::warn!(job_id = %job_id, "Lease expired before the worker reported back");
                Err(QueueError::LeaseExpired { job_id }.into())
            }
            Err(e) => {
                tracing::debug!(job_id = %lease.job_id, error = %e, "Lease operation rejected");
                Err(e.into())
            }
        }
    }

    /// Recover every job whose lease has lapsed.
    pub async fn reap_expired(&self) -> Result<ReapSummary> {
        let mut state = self.state.lock().await;
        let summary = state.reap_expired(self.config.max_lease_recoveries, Utc::now());
        if summary.is_empty() {
            return Ok(summary);
        }
        self.persist(&state).await;
        self.report_recoveries(&summary);
        Ok(summary)
    }

    fn report_recoveries(&self, summary: &ReapSummary) {
        if summary.is_empty() {
            return;
        }
        for _ in 0..summary.requeued {
            JobMetrics::lease_recovered();
        }
        for _ in 0..summary.failed {
            JobMetrics::finished(JobStatus::Failed);
        }
        tracing::warn!(
            requeued = summary.requeued,
            failed = summary.failed,
            job_ids = ?summary.job_ids,
            "Recovered jobs with expired leases"
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get(&self, job_id: JobId) -> Result<Job> {
        let state = self.state.lock().await;
        state
            .get(job_id)
            .cloned()
            .ok_or_else(|| QueueError::NotFound { job_id }.into())
    }

    pub async fn events(&self, job_id: JobId) -> Result<Vec<JobEvent>> {
        let state = self.state.lock().await;
        state
            .events(job_id)
            .map(<[JobEvent]>::to_vec)
            .ok_or_else(|| QueueError::NotFound { job_id }.into())
    }

    pub async fn list(&self, status: Option<JobStatus>, limit: usize) -> Vec<Job> {
        self.state.lock().await.list(status, limit)
    }

    pub async fn stats(&self) -> QueueStats {
        self.state.lock().await.stats()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.pending_len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
