//! Worker pool: a fixed number of slots pulling jobs from the queue.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::attempt::{AttemptEnd, AttemptRunner};
use super::job::{JobId, NewJob};
use super::queue::JobQueue;
use crate::error::{ConfigError, Result, TierflowError};
use crate::execution::ExecutionBackend;
use crate::settings::{ConfigStore, WorkerConfig};
use crate::telemetry::metrics::PoolMetrics;

/// Statistics for the worker pool.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    /// Jobs claimed from the queue
    pub claimed: Arc<AtomicU64>,
    /// Jobs finished successfully
    pub succeeded: Arc<AtomicU64>,
    /// Jobs finished as failed
    pub failed: Arc<AtomicU64>,
    /// Same-tier retries scheduled
    pub retried: Arc<AtomicU64>,
    /// Escalations scheduled
    pub escalated: Arc<AtomicU64>,
    /// Attempts abandoned because the lease was gone
    pub lease_lost: Arc<AtomicU64>,
    /// Slots currently running an attempt
    pub active: Arc<AtomicU64>,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn claimed(&self) -> u64 {
        self.claimed.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    pub fn escalated(&self) -> u64 {
        self.escalated.load(Ordering::Relaxed)
    }

    pub fn lease_lost(&self) -> u64 {
        self.lease_lost.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }
}

/// Handle for controlling a running pool.
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    stats: WorkerStats,
    config: WorkerConfig,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Signal every slot to stop. Attempts already running are finished
    /// first.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Get worker statistics.
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// The worker settings the pool was started with.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Wait for all slots and the reaper to exit.
    pub async fn join(self) {
        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
    }

    /// Signal shutdown and wait for it to complete.
    pub async fn shutdown_and_join(self) {
        self.shutdown();
        self.join().await;
    }
}

/// Runs jobs from a [`JobQueue`] on up to `max_concurrent_jobs` slots.
///
/// Each slot processes one attempt at a time, so the slot count is a hard
/// cap on concurrent attempts, requeued escalations included.
pub struct WorkerPool {
    config: Arc<ConfigStore>,
    queue: Arc<JobQueue>,
    backend: Arc<dyn ExecutionBackend>,
    stats: WorkerStats,
    wake: Arc<Notify>,
    started: AtomicBool,
}

impl WorkerPool {
    pub fn new(
        config: Arc<ConfigStore>,
        queue: Arc<JobQueue>,
        backend: Arc<dyn ExecutionBackend>,
    ) -> Self {
        Self {
            config,
            queue,
            backend,
            stats: WorkerStats::new(),
            wake: Arc::new(Notify::new()),
            started: AtomicBool::new(false),
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn config_store(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Submit a job with default priority and no payload.
    pub async fn submit(&self, stage: &str, duration_estimate_minutes: f64) -> Result<JobId> {
        self.submit_job(NewJob::new(stage, duration_estimate_minutes)).await
    }

    /// Validate and enqueue a job, then wake an idle slot.
    pub async fn submit_job(&self, job: NewJob) -> Result<JobId> {
        let minutes = job.duration_estimate_minutes;
        if !minutes.is_finite() || minutes < 0.0 {
            return Err(ConfigError::out_of_range(
                "duration_estimate_minutes",
                minutes,
                "a finite number >= 0",
            )
            .into());
        }
        if !self.config.routing().base_tier_by_stage.contains_key(&job.stage) {
            return Err(ConfigError::UnknownStage { stage: job.stage }.into());
        }

        let job_id = self.queue.enqueue(job).await?;
        self.wake.notify_one();
        Ok(job_id)
    }

    /// Start the slots and the lease reaper.
    ///
    /// Worker settings are read once here; patches made later take effect
    /// on the next start.
    pub fn start(&self) -> Result<WorkerHandle> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(TierflowError::internal("worker pool already started"));
        }

        let worker = self.config.get_worker();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = AttemptRunner {
            queue: self.queue.clone(),
            config: self.config.clone(),
            backend: self.backend.clone(),
            stats: self.stats.clone(),
            heartbeat_interval: worker.heartbeat_interval(),
            lease_duration: worker.lease_duration(),
        };

        let mut tasks = Vec::with_capacity(worker.max_concurrent_jobs + 1);
        for slot in 0..worker.max_concurrent_jobs {
            tasks.push(tokio::spawn(run_slot(
                slot,
                runner.clone(),
                worker.clone(),
                self.wake.clone(),
                shutdown_rx.clone(),
            )));
        }
        tasks.push(tokio::spawn(run_reaper(
            self.queue.clone(),
            worker.heartbeat_interval(),
            shutdown_rx,
        )));

        tracing::info!(
            concurrency = worker.max_concurrent_jobs,
            poll_interval_secs = worker.poll_interval_seconds,
            heartbeat_interval_secs = worker.heartbeat_interval_seconds,
            lease_secs = worker.lease_duration().as_secs(),
            "Worker pool started"
        );

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            stats: self.stats.clone(),
            config: worker,
            tasks,
        })
    }
}

/// Wait for a poll tick, a submission or shutdown. Returns false on shutdown.
async fn wait_for_work(
    poll: std::time::Duration,
    wake: &Notify,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    if *shutdown_rx.borrow() {
        return false;
    }
    tokio::select! {
        changed = shutdown_rx.changed() => changed.is_ok() && !*shutdown_rx.borrow(),
        _ = wake.notified() => true,
        _ = tokio::time::sleep(poll) => true,
    }
}

async fn run_slot(
    slot: usize,
    runner: AttemptRunner,
    worker: WorkerConfig,
    wake: Arc<Notify>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::debug!(slot, "Worker slot started");

    while wait_for_work(worker.poll_interval(), &wake, &mut shutdown_rx).await {
        // Keep claiming while work is there; a requeued job waits for the
        // next tick.
        while !*shutdown_rx.borrow() {
            let claim = match runner.queue.claim_next(worker.lease_duration()).await {
                Ok(Some(claim)) => claim,
                Ok(None) => break,
                Err(e) => {
                    e.log();
                    break;
                }
            };

            WorkerStats::bump(&runner.stats.claimed);
            let active = runner.stats.active.fetch_add(1, Ordering::Relaxed) + 1;
            PoolMetrics::set_active(active);

            let end = runner.run(claim).await;

            let active = runner.stats.active.fetch_sub(1, Ordering::Relaxed) - 1;
            PoolMetrics::set_active(active);

            if end != AttemptEnd::Finished {
                break;
            }
        }
    }

    tracing::debug!(slot, "Worker slot stopped");
}

async fn run_reaper(
    queue: Arc<JobQueue>,
    every: std::time::Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = queue.reap_expired().await {
                    e.log();
                }
            }
        }
    }
}
