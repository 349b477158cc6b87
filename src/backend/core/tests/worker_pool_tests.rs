//! Comprehensive unit tests for the worker pool.
//!
//! Tests cover:
//! - Job submission and validation
//! - Initial tier resolution at attempt time
//! - Retry, escalation and give-up paths
//! - Attempt deadlines enforced by the pool
//! - Cancellation while an attempt runs
//! - Concurrency cap
//! - Lease heartbeats during long attempts
//! - Statistics and shutdown

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tierflow_core::error::{ConfigError, TierflowError};
use tierflow_core::execution::{ExecutionBackend, ExecutionOutcome, ExecutionRequest};
use tierflow_core::jobs::{
    Job, JobId, JobQueue, JobStatus, NewJob, WorkerHandle, WorkerPool, WorkerStats,
};
use tierflow_core::settings::{ConfigStore, EscalationPatch, RoutingPatch, Settings, WorkerConfig};

// ============================================================================
// Test Backends
// ============================================================================

/// Plays back a fixed list of outcomes, then succeeds.
#[derive(Default)]
struct ScriptedBackend {
    script: Mutex<VecDeque<ExecutionOutcome>>,
    calls: Mutex<Vec<ExecutionRequest>>,
    delay: Duration,
}

impl ScriptedBackend {
    fn new(script: Vec<ExecutionOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn tiers(&self) -> Vec<usize> {
        self.calls.lock().unwrap().iter().map(|r| r.tier.index).collect()
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedBackend {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome {
        let tier = request.tier.index;
        self.calls.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ExecutionOutcome::Success(json!({ "tier": tier })))
    }
}

/// Records how many attempts run at once.
#[derive(Default)]
struct GaugeBackend {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ExecutionBackend for GaugeBackend {
    async fn execute(&self, _request: ExecutionRequest) -> ExecutionOutcome {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        ExecutionOutcome::Success(json!("done"))
    }
}

/// Hangs on one tier and succeeds at once on the others.
struct StallingBackend {
    stalled_tier: usize,
    calls: Mutex<Vec<usize>>,
}

impl StallingBackend {
    fn on_tier(stalled_tier: usize) -> Self {
        Self {
            stalled_tier,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn tiers(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionBackend for StallingBackend {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome {
        let tier = request.tier.index;
        self.calls.lock().unwrap().push(tier);
        if tier == self.stalled_tier {
            tokio::time::sleep(Duration::from_secs(600)).await;
        }
        ExecutionOutcome::Success(json!({ "tier": tier }))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn store_with(max_concurrent_jobs: usize) -> Arc<ConfigStore> {
    let settings = Settings {
        worker: WorkerConfig {
            max_concurrent_jobs,
            poll_interval_seconds: 1,
            heartbeat_interval_seconds: 1,
        },
        ..Default::default()
    };
    Arc::new(ConfigStore::new(settings).unwrap())
}

fn pool_with(store: Arc<ConfigStore>, backend: Arc<dyn ExecutionBackend>) -> WorkerPool {
    WorkerPool::new(store, Arc::new(JobQueue::in_memory()), backend)
}

/// Stop the pool and return its counters once every slot has settled.
async fn finish(handle: WorkerHandle) -> WorkerStats {
    let stats = handle.stats().clone();
    handle.shutdown_and_join().await;
    stats
}

async fn wait_for_terminal(queue: &JobQueue, id: JobId) -> Job {
    wait_until(queue, id, Duration::from_secs(20), |job| job.status.is_terminal()).await
}

/// Poll the job until `done` holds. `limit` is measured on the tokio clock,
/// so paused-time tests need a limit past every timer they expect to fire.
async fn wait_until(
    queue: &JobQueue,
    id: JobId,
    limit: Duration,
    done: impl Fn(&Job) -> bool,
) -> Job {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let job = queue.get(id).await.unwrap();
        if done(&job) {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} still {} after {:?}",
            id,
            job.status,
            limit
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn escalation(patch: EscalationPatch) -> RoutingPatch {
    RoutingPatch::new().with_escalation(patch)
}

// ============================================================================
// Submission Tests
// ============================================================================

#[tokio::test]
async fn test_submit_rejects_unknown_stage() {
    let pool = pool_with(store_with(1), Arc::new(ScriptedBackend::default()));
    let err = pool.submit("translator", 5.0).await.unwrap_err();
    assert!(matches!(
        err,
        TierflowError::Config(ConfigError::UnknownStage { .. })
    ));
    assert!(pool.queue().is_empty().await);
}

#[tokio::test]
async fn test_submit_rejects_bad_duration() {
    let pool = pool_with(store_with(1), Arc::new(ScriptedBackend::default()));
    for minutes in [-1.0, f64::NAN, f64::INFINITY] {
        let err = pool.submit("analyst", minutes).await.unwrap_err();
        assert!(matches!(
            err,
            TierflowError::Config(ConfigError::OutOfRangeValue { .. })
        ));
    }
    assert!(pool.submit("analyst", 0.0).await.is_ok());
}

#[tokio::test]
async fn test_start_twice_fails() {
    let pool = pool_with(store_with(1), Arc::new(ScriptedBackend::default()));
    let handle = pool.start().unwrap();
    assert!(pool.start().is_err());
    handle.shutdown_and_join().await;
}

// ============================================================================
// Routing Tests
// ============================================================================

#[tokio::test]
async fn test_job_runs_at_resolved_tier() {
    let backend = Arc::new(ScriptedBackend::default());
    let pool = pool_with(store_with(2), backend.clone());
    let handle = pool.start().unwrap();

    let id = pool.submit("analyst", 20.0).await.unwrap();
    let job = wait_for_terminal(pool.queue(), id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.current_tier, Some(1));
    assert_eq!(job.result, Some(json!({ "tier": 1 })));
    assert_eq!(backend.tiers(), vec![1]);

    let stats = finish(handle).await;
    assert_eq!(stats.succeeded(), 1);
    assert_eq!(stats.claimed(), 1);
}

#[tokio::test]
async fn test_initial_tier_uses_config_at_attempt_time() {
    let backend = Arc::new(ScriptedBackend::default());
    let store = store_with(1);
    let pool = pool_with(store.clone(), backend.clone());

    let id = pool.submit("analyst", 1.0).await.unwrap();
    store
        .patch_routing(&RoutingPatch::new().with_base_tier("analyst", 2))
        .unwrap();

    let handle = pool.start().unwrap();
    let job = wait_for_terminal(pool.queue(), id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(backend.tiers(), vec![2]);
    handle.shutdown_and_join().await;
}

#[tokio::test]
async fn test_stage_removed_after_submit_fails_job() {
    let backend = Arc::new(ScriptedBackend::default());
    let store = store_with(1);
    let pool = pool_with(store.clone(), backend.clone());
    let id = pool
        .submit_job(NewJob::new("analyst", 1.0).with_payload(json!({ "prompt": "hi" })))
        .await
        .unwrap();

    // Swap in a config that no longer knows the stage by shrinking the map
    // through a fresh store
    let mut settings = store.settings();
    settings.routing.base_tier_by_stage.remove("analyst");
    let replaced = Arc::new(ConfigStore::new(settings).unwrap());
    let pool = WorkerPool::new(replaced, pool.queue().clone(), backend.clone());

    let handle = pool.start().unwrap();
    let job = wait_for_terminal(pool.queue(), id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("unknown stage 'analyst'"));
    assert!(backend.tiers().is_empty());
    handle.shutdown_and_join().await;
}

// ============================================================================
// Escalation Tests
// ============================================================================

#[tokio::test]
async fn test_retry_then_escalate_then_succeed() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        ExecutionOutcome::failure("rate limited"),
        ExecutionOutcome::failure("rate limited"),
    ]));
    let pool = pool_with(store_with(1), backend.clone());
    let handle = pool.start().unwrap();

    let id = pool.submit("analyst", 1.0).await.unwrap();
    let job = wait_for_terminal(pool.queue(), id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    // One retry at tier 0, then up one tier
    assert_eq!(backend.tiers(), vec![0, 0, 1]);
    assert_eq!(job.escalations, 1);
    assert_eq!(job.total_attempts, 3);

    let stats = finish(handle).await;
    assert_eq!(stats.retried(), 1);
    assert_eq!(stats.escalated(), 1);
    assert_eq!(stats.succeeded(), 1);
}

#[tokio::test]
async fn test_top_tier_exhausted_fails() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        ExecutionOutcome::failure("boom"),
        ExecutionOutcome::failure("boom again"),
    ]));
    let pool = pool_with(store_with(1), backend.clone());
    let handle = pool.start().unwrap();

    let id = pool.submit("manager", 1.0).await.unwrap();
    let job = wait_for_terminal(pool.queue(), id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(backend.tiers(), vec![2, 2]);
    let error = job.error.unwrap();
    assert!(error.contains("boom again"));
    assert!(error.contains("retries exhausted at the highest tier"));
    assert_eq!(finish(handle).await.failed(), 1);
}

#[tokio::test]
async fn test_disabled_escalation_is_single_attempt() {
    let backend = Arc::new(ScriptedBackend::new(vec![ExecutionOutcome::failure("nope")]));
    let store = store_with(1);
    store
        .patch_routing(&RoutingPatch::new().with_escalation(EscalationPatch {
            enabled: Some(false),
            ..Default::default()
        }))
        .unwrap();
    let pool = pool_with(store, backend.clone());
    let handle = pool.start().unwrap();

    let id = pool.submit("seo", 1.0).await.unwrap();
    let job = wait_for_terminal(pool.queue(), id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.total_attempts, 1);
    assert!(job.error.unwrap().contains("escalation disabled"));

    handle.shutdown_and_join().await;
}

#[tokio::test]
async fn test_timeout_not_eligible() {
    let backend = Arc::new(ScriptedBackend::new(vec![ExecutionOutcome::Timeout]));
    let store = store_with(1);
    store
        .patch_routing(&RoutingPatch::new().with_escalation(EscalationPatch {
            on_timeout: Some(false),
            ..Default::default()
        }))
        .unwrap();
    let pool = pool_with(store, backend.clone());
    let handle = pool.start().unwrap();

    let id = pool.submit("seo", 1.0).await.unwrap();
    let job = wait_for_terminal(pool.queue(), id).await;

    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.unwrap();
    assert!(error.contains("timed out after 120s"));
    assert!(error.contains("escalation not enabled for timeout"));

    handle.shutdown_and_join().await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_backend_times_out_and_escalates() {
    let backend = Arc::new(StallingBackend::on_tier(0));
    let store = store_with(1);
    store
        .patch_routing(&escalation(EscalationPatch {
            timeout_seconds: Some(30),
            max_retries_per_tier: Some(0),
            ..Default::default()
        }))
        .unwrap();
    let pool = pool_with(store, backend.clone());
    let handle = pool.start().unwrap();

    let id = pool.submit("analyst", 1.0).await.unwrap();
    let job = wait_until(pool.queue(), id, Duration::from_secs(300), |j| {
        j.status.is_terminal()
    })
    .await;

    // The stalled call is cut off at 30s and the job moves up a tier
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(backend.tiers(), vec![0, 1]);
    assert_eq!(job.current_tier, Some(1));
    assert_eq!(job.escalations, 1);
    assert_eq!(finish(handle).await.escalated(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_backend_times_out_without_escalation() {
    let backend = Arc::new(StallingBackend::on_tier(0));
    let store = store_with(1);
    store
        .patch_routing(&escalation(EscalationPatch {
            timeout_seconds: Some(30),
            on_timeout: Some(false),
            ..Default::default()
        }))
        .unwrap();
    let pool = pool_with(store, backend.clone());
    let handle = pool.start().unwrap();

    let started = tokio::time::Instant::now();
    let id = pool.submit("analyst", 1.0).await.unwrap();
    let job = wait_until(pool.queue(), id, Duration::from_secs(300), |j| {
        j.status.is_terminal()
    })
    .await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.total_attempts, 1);
    let error = job.error.unwrap();
    assert!(error.contains("timed out after 30s"));
    assert!(error.contains("escalation not enabled for timeout"));
    // Settled by the deadline, not by the backend's own 600s stall
    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(finish(handle).await.failed(), 1);
}

// ============================================================================
// Cancellation Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_attempt_drops_result() {
    let backend = Arc::new(StallingBackend::on_tier(0));
    let pool = pool_with(store_with(1), backend.clone());
    let handle = pool.start().unwrap();

    let stalled = pool.submit("analyst", 1.0).await.unwrap();
    wait_until(pool.queue(), stalled, Duration::from_secs(10), |j| {
        j.status == JobStatus::Running
    })
    .await;
    pool.queue().cancel(stalled).await.unwrap();

    // The same single slot must come free and pick up new work
    let next = pool.submit("manager", 1.0).await.unwrap();
    let done = wait_until(pool.queue(), next, Duration::from_secs(60), |j| {
        j.status.is_terminal()
    })
    .await;
    assert_eq!(done.status, JobStatus::Succeeded);

    let cancelled = pool.queue().get(stalled).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.result.is_none());
    assert_eq!(backend.tiers(), vec![0, 2]);

    let stats = finish(handle).await;
    assert_eq!(stats.lease_lost(), 1);
    assert_eq!(stats.succeeded(), 1);
    assert_eq!(stats.claimed(), 2);
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_cap_is_respected() {
    let backend = Arc::new(GaugeBackend::default());
    let pool = pool_with(store_with(2), backend.clone());
    let handle = pool.start().unwrap();

    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(pool.submit("formatter", 1.0).await.unwrap());
    }
    for id in ids {
        let job = wait_for_terminal(pool.queue(), id).await;
        assert_eq!(job.status, JobStatus::Succeeded);
    }

    let peak = backend.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak concurrency was {}", peak);

    let stats = finish(handle).await;
    assert_eq!(stats.succeeded(), 6);
    assert_eq!(stats.active(), 0);
}

#[tokio::test]
async fn test_heartbeat_outlives_lease() {
    // Lease is 3s; the attempt takes longer and must survive on heartbeats
    let backend = Arc::new(ScriptedBackend::default().with_delay(Duration::from_millis(4500)));
    let pool = pool_with(store_with(1), backend.clone());
    let handle = pool.start().unwrap();
    assert_eq!(handle.config().lease_duration(), Duration::from_secs(3));

    let id = pool.submit("analyst", 1.0).await.unwrap();
    let job = wait_for_terminal(pool.queue(), id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.lease_recoveries, 0);
    assert_eq!(backend.tiers(), vec![0]);
    assert_eq!(finish(handle).await.lease_lost(), 0);
}

#[tokio::test]
async fn test_shutdown_is_prompt_when_idle() {
    let pool = pool_with(store_with(3), Arc::new(ScriptedBackend::default()));
    let handle = pool.start().unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown_and_join())
        .await
        .expect("pool did not shut down");
}
