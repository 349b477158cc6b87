//! One execution attempt: tier selection, backend call under a deadline,
//! lease heartbeats, and the escalation decision that follows.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::job::{Job, Lease};
use super::queue::{Claim, JobQueue};
use super::worker::WorkerStats;
use crate::error::{ConfigError, Result, TierflowError};
use crate::execution::{ExecutionBackend, ExecutionOutcome, ExecutionRequest};
use crate::routing::{decide, resolve_tier, Decision, FailureKind, RoutingConfig, Tier};
use crate::settings::ConfigStore;
use crate::telemetry::metrics::JobMetrics;

/// How an attempt left its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttemptEnd {
    /// Succeeded or failed for good
    Finished,
    /// Back in the queue for a retry or escalation
    Requeued,
    /// Lease lost or queue refused; someone else owns the job now
    Abandoned,
}

/// Everything a slot needs to run attempts.
#[derive(Clone)]
pub(crate) struct AttemptRunner {
    pub(crate) queue: Arc<JobQueue>,
    pub(crate) config: Arc<ConfigStore>,
    pub(crate) backend: Arc<dyn ExecutionBackend>,
    pub(crate) stats: WorkerStats,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) lease_duration: Duration,
}

/// Tier for the coming attempt.
///
/// Fresh jobs are routed from the current config; jobs that already retried
/// or escalated keep their stored tier, which must still exist.
pub(crate) fn select_tier(job: &Job, routing: &RoutingConfig) -> std::result::Result<Tier, ConfigError> {
    let index = match job.current_tier {
        Some(tier) if !job.needs_initial_routing() => tier,
        _ => resolve_tier(&job.stage, job.duration_estimate_minutes, routing)?,
    };
    routing.tiers.check(index).cloned()
}

impl AttemptRunner {
    pub(crate) async fn run(&self, claim: Claim) -> AttemptEnd {
        let Claim { mut lease, job } = claim;

        // One snapshot governs the whole attempt, reloads notwithstanding.
        let routing = self.config.routing();

        let tier = match select_tier(&job, &routing) {
            Ok(tier) => tier,
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    stage = %job.stage,
                    error = %e,
                    "Job cannot be routed"
                );
                let outcome = self.queue.fail(&lease, format!("routing failed: {}", e)).await;
                return self.settle(&job, outcome, AttemptEnd::Finished);
            }
        };

        let job = match self.queue.start(&lease, tier.index).await {
            Ok(job) => job,
            Err(e) => return self.abandon(&job, e),
        };

        let deadline = routing.escalation.timeout();
        let request = ExecutionRequest {
            job_id: job.id,
            stage: job.stage.clone(),
            tier: tier.clone(),
            payload: job.payload.clone(),
            deadline,
            attempt: job.total_attempts,
        };

        tracing::info!(
            job_id = %job.id,
            stage = %job.stage,
            tier = tier.index,
            model = %tier.model,
            attempt = job.total_attempts,
            "Attempt started"
        );

        let started = Instant::now();
        let outcome = match self.execute(&mut lease, request, deadline).await {
            Ok(outcome) => outcome,
            Err(e) => return self.abandon(&job, e),
        };
        JobMetrics::attempt(
            &job.stage,
            tier.index,
            outcome.label(),
            started.elapsed().as_secs_f64(),
        );

        let reason = outcome.describe(deadline);
        let kind = match outcome {
            ExecutionOutcome::Success(value) => {
                let done = self.queue.complete(&lease, value).await;
                if done.is_ok() {
                    tracing::info!(
                        job_id = %job.id,
                        stage = %job.stage,
                        tier = tier.index,
                        "Job succeeded"
                    );
                }
                return self.settle(&job, done, AttemptEnd::Finished);
            }
            ExecutionOutcome::Failure(_) => FailureKind::Failure,
            ExecutionOutcome::Timeout => FailureKind::Timeout,
        };

        self.apply_decision(&job, &lease, &tier, &routing, kind, reason).await
    }

    /// Run the backend call, renewing the lease until it returns.
    ///
    /// Returns an error only when the lease is gone; the in-flight call is
    /// dropped and its result never reaches the queue.
    async fn execute(
        &self,
        lease: &mut Lease,
        request: ExecutionRequest,
        deadline: Duration,
    ) -> Result<ExecutionOutcome> {
        let execution = tokio::time::timeout(deadline, self.backend.execute(request));
        tokio::pin!(execution);

        let first_beat = tokio::time::Instant::now() + self.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(first_beat, self.heartbeat_interval);

        loop {
            tokio::select! {
                result = &mut execution => {
                    return Ok(result.unwrap_or(ExecutionOutcome::Timeout));
                }
                _ = heartbeat.tick() => {
                    match self.queue.heartbeat(lease, self.lease_duration).await {
                        Ok(renewed) => *lease = renewed,
                        Err(e) if e.is_lease_loss() => return Err(e),
                        // Transient; the lease still has time left.
                        Err(e) => e.log(),
                    }
                }
            }
        }
    }

    async fn apply_decision(
        &self,
        job: &Job,
        lease: &Lease,
        tier: &Tier,
        routing: &RoutingConfig,
        kind: FailureKind,
        reason: String,
    ) -> AttemptEnd {
        let attempts = job.attempts_at_current_tier;
        let decision = decide(kind, tier.index, attempts, routing.max_tier(), &routing.escalation);

        match decision {
            Decision::RetrySameTier => {
                tracing::info!(
                    job_id = %job.id,
                    stage = %job.stage,
                    tier = tier.index,
                    retry = attempts + 1,
                    reason = %reason,
                    "Retrying at same tier"
                );
                let requeued = self.queue.requeue(lease, tier.index, attempts + 1).await;
                if requeued.is_ok() {
                    WorkerStats::bump(&self.stats.retried);
                }
                self.settle(job, requeued, AttemptEnd::Requeued)
            }
            Decision::EscalateTo(next) => {
                if let Err(e) = routing.tiers.check(next) {
                    tracing::error!(
                        job_id = %job.id,
                        from = tier.index,
                        to = next,
                        error = %e,
                        "Escalation target missing from tier table"
                    );
                    let failed = self
                        .queue
                        .fail(lease, format!("{}; cannot escalate: {}", reason, e))
                        .await;
                    return self.settle(job, failed, AttemptEnd::Finished);
                }

                tracing::info!(
                    job_id = %job.id,
                    stage = %job.stage,
                    from = tier.index,
                    to = next,
                    reason = %reason,
                    "Escalating job"
                );
                let requeued = self.queue.requeue(lease, next, 0).await;
                if requeued.is_ok() {
                    WorkerStats::bump(&self.stats.escalated);
                    JobMetrics::escalated(&job.stage, tier.index, next);
                }
                self.settle(job, requeued, AttemptEnd::Requeued)
            }
            Decision::GiveUp(why) => {
                tracing::warn!(
                    job_id = %job.id,
                    stage = %job.stage,
                    tier = tier.index,
                    reason = %reason,
                    give_up = %why,
                    "Job failed"
                );
                let failed = self.queue.fail(lease, format!("{} ({})", reason, why)).await;
                self.settle(job, failed, AttemptEnd::Finished)
            }
        }
    }

    /// Count the result of a queue write that ends the attempt.
    fn settle(&self, job: &Job, outcome: Result<Job>, end: AttemptEnd) -> AttemptEnd {
        match outcome {
            Ok(updated) => {
                match updated.status {
                    super::JobStatus::Succeeded => WorkerStats::bump(&self.stats.succeeded),
                    super::JobStatus::Failed => WorkerStats::bump(&self.stats.failed),
                    _ => {}
                }
                end
            }
            Err(e) => self.abandon(job, e),
        }
    }

    fn abandon(&self, job: &Job, error: TierflowError) -> AttemptEnd {
        if error.is_lease_loss() {
            WorkerStats::bump(&self.stats.lease_lost);
            tracing::warn!(
                job_id = %job.id,
                stage = %job.stage,
                error = %error,
                "Lease lost; abandoning attempt"
            );
        } else {
            error.log();
        }
        AttemptEnd::Abandoned
    }
}
