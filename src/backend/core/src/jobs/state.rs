//! In-memory queue state machine.
//!
//! Pure and synchronous: every operation takes the current time explicitly,
//! which keeps lease arithmetic deterministic under test. [`super::JobQueue`]
//! wraps it with locking, persistence and logging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use uuid::Uuid;

use super::job::{Job, JobEvent, JobEventKind, JobId, JobPriority, JobStatus, Lease, NewJob};
use crate::error::QueueError;

type ReadyKey = (Reverse<JobPriority>, u64, JobId);

/// Counts of jobs by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub paused: usize,
    pub claimed: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.pending
            + self.paused
            + self.claimed
            + self.running
            + self.succeeded
            + self.failed
            + self.cancelled
    }
}

/// Result of an expired-lease sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReapSummary {
    /// Jobs returned to Pending
    pub requeued: usize,
    /// Jobs finalized because they expired too many times
    pub failed: usize,
    pub job_ids: Vec<JobId>,
}

impl ReapSummary {
    pub fn is_empty(&self) -> bool {
        self.job_ids.is_empty()
    }
}

/// What happened to a job whose lease ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Requeued,
    Failed,
}

/// Serializable form of the queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub next_seq: u64,
    pub jobs: Vec<Job>,
}

/// All jobs plus an index of claimable ones.
#[derive(Debug, Default)]
pub struct QueueState {
    jobs: HashMap<JobId, Job>,
    ready: BTreeSet<ReadyKey>,
    next_seq: u64,
}

pub(crate) fn lease_expiry(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    let lease = chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::days(3650));
    now + lease
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: QueueSnapshot) -> Self {
        let mut state = Self {
            jobs: HashMap::with_capacity(snapshot.jobs.len()),
            ready: BTreeSet::new(),
            next_seq: snapshot.next_seq,
        };
        for job in snapshot.jobs {
            state.next_seq = state.next_seq.max(job.seq + 1);
            if job.status == JobStatus::Pending {
                state.ready.insert(ready_key(&job));
            }
            state.jobs.insert(job.id, job);
        }
        state
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let mut jobs: Vec<Job> = self.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| (j.created_at, j.seq));
        QueueSnapshot {
            next_seq: self.next_seq,
            jobs,
        }
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Producer side
    // ─────────────────────────────────────────────────────────────────────────

    pub fn enqueue(
        &mut self,
        new: NewJob,
        capacity: usize,
        now: DateTime<Utc>,
    ) -> Result<JobId, QueueError> {
        if self.ready.len() >= capacity {
            return Err(QueueError::QueueFull { capacity });
        }
        let seq = self.take_seq();
        let job = Job::from_submission(new, seq, now);
        let id = job.id;
        self.ready.insert(ready_key(&job));
        self.jobs.insert(id, job);
        Ok(id)
    }

    pub fn cancel(&mut self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, QueueError> {
        let job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(QueueError::NotFound { job_id })?;
        if job.status.is_terminal() {
            return Err(QueueError::InvalidState {
                job_id,
                status: job.status,
                operation: "cancel",
            });
        }
        if job.status == JobStatus::Pending {
            self.ready.remove(&ready_key(job));
        }
        job.status = JobStatus::Cancelled;
        job.release_lease();
        job.finished_at = Some(now);
        job.record(now, JobEventKind::Cancelled);
        Ok(job.clone())
    }

    /// Take a pending job out of the claim order.
    pub fn pause(&mut self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, QueueError> {
        let job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(QueueError::NotFound { job_id })?;
        if job.status != JobStatus::Pending {
            return Err(QueueError::InvalidState {
                job_id,
                status: job.status,
                operation: "pause",
            });
        }
        self.ready.remove(&ready_key(job));
        job.status = JobStatus::Paused;
        job.record(now, JobEventKind::Paused);
        Ok(job.clone())
    }

    /// Return a paused job to the claim order at its original position.
    pub fn resume(&mut self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, QueueError> {
        let job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(QueueError::NotFound { job_id })?;
        if job.status != JobStatus::Paused {
            return Err(QueueError::InvalidState {
                job_id,
                status: job.status,
                operation: "resume",
            });
        }
        job.status = JobStatus::Pending;
        job.record(now, JobEventKind::Resumed);
        self.ready.insert(ready_key(job));
        Ok(job.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Worker side
    // ─────────────────────────────────────────────────────────────────────────

    /// Claim the highest-priority, oldest pending job.
    ///
    /// Expired leases are recovered first so abandoned jobs are claimable.
    pub fn claim_next(
        &mut self,
        lease: Duration,
        max_recoveries: u32,
        now: DateTime<Utc>,
    ) -> Option<(Lease, Job)> {
        self.reap_expired(max_recoveries, now);

        let key = self.ready.pop_first()?;
        let job = self.jobs.get_mut(&key.2)?;
        let expires_at = lease_expiry(now, lease);
        let token = Uuid::new_v4();

        job.status = JobStatus::Claimed;
        job.lease_token = Some(token);
        job.lease_expiry = Some(expires_at);
        job.record(now, JobEventKind::Claimed { lease_expiry: expires_at });

        Some((
            Lease {
                job_id: job.id,
                token,
                expires_at,
            },
            job.clone(),
        ))
    }

    /// Verify `lease` is current. An expired lease recovers the job and
    /// yields `LeaseExpired`.
    fn check_lease(
        &mut self,
        lease: &Lease,
        max_recoveries: u32,
        now: DateTime<Utc>,
    ) -> Result<&mut Job, QueueError> {
        let job_id = lease.job_id;
        let job = self.jobs.get(&job_id).ok_or(QueueError::NotFound { job_id })?;
        if !job.status.is_leased() || job.lease_token != Some(lease.token) {
            return Err(QueueError::NotClaimed { job_id });
        }
        if job.lease_expiry.map_or(true, |expiry| expiry <= now) {
            self.recover(job_id, max_recoveries, now);
            return Err(QueueError::LeaseExpired { job_id });
        }
        self.jobs
            .get_mut(&job_id)
            .ok_or(QueueError::NotFound { job_id })
    }

    pub fn heartbeat(
        &mut self,
        lease: &Lease,
        extend_by: Duration,
        max_recoveries: u32,
        now: DateTime<Utc>,
    ) -> Result<Lease, QueueError> {
        let job = self.check_lease(lease, max_recoveries, now)?;
        let expires_at = lease_expiry(now, extend_by);
        job.lease_expiry = Some(expires_at);
        job.updated_at = now;
        Ok(Lease {
            expires_at,
            ..lease.clone()
        })
    }

    /// Mark the attempt as running at `tier`.
    pub fn start(
        &mut self,
        lease: &Lease,
        tier: usize,
        max_recoveries: u32,
        now: DateTime<Utc>,
    ) -> Result<Job, QueueError> {
        let job = self.check_lease(lease, max_recoveries, now)?;
        if job.status != JobStatus::Claimed {
            return Err(QueueError::InvalidState {
                job_id: job.id,
                status: job.status,
                operation: "start",
            });
        }
        job.status = JobStatus::Running;
        job.current_tier = Some(tier);
        job.total_attempts += 1;
        let attempt = job.total_attempts;
        job.record(now, JobEventKind::Started { tier, attempt });
        Ok(job.clone())
    }

    pub fn complete(
        &mut self,
        lease: &Lease,
        result: serde_json::Value,
        max_recoveries: u32,
        now: DateTime<Utc>,
    ) -> Result<Job, QueueError> {
        let job = self.check_lease(lease, max_recoveries, now)?;
        job.status = JobStatus::Succeeded;
        job.result = Some(result);
        job.error = None;
        job.release_lease();
        job.finished_at = Some(now);
        let tier = job.current_tier;
        job.record(now, JobEventKind::Succeeded { tier });
        Ok(job.clone())
    }

    pub fn fail(
        &mut self,
        lease: &Lease,
        error: String,
        max_recoveries: u32,
        now: DateTime<Utc>,
    ) -> Result<Job, QueueError> {
        let job = self.check_lease(lease, max_recoveries, now)?;
        finalize_failed(job, error, now);
        Ok(job.clone())
    }

    /// Return the job to Pending with new routing state. It goes to the back
    /// of its priority class.
    pub fn requeue(
        &mut self,
        lease: &Lease,
        tier: usize,
        attempts_at_tier: u32,
        max_recoveries: u32,
        now: DateTime<Utc>,
    ) -> Result<Job, QueueError> {
        let seq = self.next_seq;
        let job = self.check_lease(lease, max_recoveries, now)?;
        let previous = job.current_tier;

        if previous != Some(tier) {
            job.escalations += 1;
            job.record(now, JobEventKind::Escalated { from: previous, to: tier });
        } else {
            job.record(now, JobEventKind::Retried { tier, attempts_at_tier });
        }
        job.current_tier = Some(tier);
        job.attempts_at_current_tier = attempts_at_tier;
        job.status = JobStatus::Pending;
        job.release_lease();
        job.seq = seq;
        let key = ready_key(job);
        let snapshot = job.clone();

        self.next_seq += 1;
        self.ready.insert(key);
        Ok(snapshot)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lease recovery
    // ─────────────────────────────────────────────────────────────────────────

    fn recover(&mut self, job_id: JobId, max_recoveries: u32, now: DateTime<Utc>) -> Option<Recovery> {
        let seq = self.next_seq;
        let job = self.jobs.get_mut(&job_id)?;
        if !job.status.is_leased() {
            return None;
        }

        job.lease_recoveries += 1;
        if job.lease_recoveries > max_recoveries {
            let message = format!(
                "lease expired too many times ({} recoveries)",
                job.lease_recoveries
            );
            finalize_failed(job, message, now);
            return Some(Recovery::Failed);
        }

        let recoveries = job.lease_recoveries;
        job.status = JobStatus::Pending;
        job.release_lease();
        job.seq = seq;
        job.record(now, JobEventKind::LeaseRecovered { recoveries });
        let key = ready_key(job);
        self.next_seq += 1;
        self.ready.insert(key);
        Some(Recovery::Requeued)
    }

    /// Recover every leased job whose lease has run out.
    pub fn reap_expired(&mut self, max_recoveries: u32, now: DateTime<Utc>) -> ReapSummary {
        let mut expired: Vec<&Job> = self
            .jobs
            .values()
            .filter(|j| j.status.is_leased() && j.lease_expiry.map_or(true, |e| e <= now))
            .collect();
        expired.sort_by_key(|j| (Reverse(j.priority), j.seq));
        let expired: Vec<JobId> = expired.into_iter().map(|j| j.id).collect();

        let mut summary = ReapSummary::default();
        for job_id in expired {
            match self.recover(job_id, max_recoveries, now) {
                Some(Recovery::Requeued) => summary.requeued += 1,
                Some(Recovery::Failed) => summary.failed += 1,
                None => continue,
            }
            summary.job_ids.push(job_id);
        }
        summary
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub fn get(&self, job_id: JobId) -> Option<&Job> {
        self.jobs.get(&job_id)
    }

    pub fn events(&self, job_id: JobId) -> Option<&[JobEvent]> {
        self.jobs.get(&job_id).map(|j| j.events.as_slice())
    }

    /// Jobs ordered by priority (highest first), then queue position.
    pub fn list(&self, status: Option<JobStatus>, limit: usize) -> Vec<Job> {
        let mut jobs: Vec<&Job> = self
            .jobs
            .values()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .collect();
        jobs.sort_by_key(|j| (Reverse(j.priority), j.seq));
        jobs.into_iter().take(limit).cloned().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.ready.len()
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for job in self.jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Paused => stats.paused += 1,
                JobStatus::Claimed => stats.claimed += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Succeeded => stats.succeeded += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

fn ready_key(job: &Job) -> ReadyKey {
    (Reverse(job.priority), job.seq, job.id)
}

fn finalize_failed(job: &mut Job, error: String, now: DateTime<Utc>) {
    job.status = JobStatus::Failed;
    job.release_lease();
    job.finished_at = Some(now);
    job.record(now, JobEventKind::Failed { error: error.clone() });
    job.error = Some(error);
}
