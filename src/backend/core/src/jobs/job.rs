//! Job records and their lifecycle types.
//!
//! - **JobId / JobStatus / JobPriority**: identification and queue ordering
//! - **Job**: the queue's record of one unit of pipeline work
//! - **NewJob**: what a producer submits
//! - **Lease**: a worker's time-bounded claim on a job
//! - **JobEvent**: per-job history entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════════
// Job Identification
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed
    Pending,
    /// Held out of the claim order until resumed
    Paused,
    /// Leased by a worker, attempt not yet started
    Claimed,
    /// Leased by a worker, attempt in progress
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished unsuccessfully; no further attempts
    Failed,
    /// Withdrawn before finishing
    Cancelled,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Check if a worker currently holds a lease on the job.
    pub fn is_leased(&self) -> bool {
        matches!(self, Self::Claimed | Self::Running)
    }

    pub const ALL: [JobStatus; 7] = [
        Self::Pending,
        Self::Paused,
        Self::Claimed,
        Self::Running,
        Self::Succeeded,
        Self::Failed,
        Self::Cancelled,
    ];
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Paused => write!(f, "paused"),
            Self::Claimed => write!(f, "claimed"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown job status '{}'", s))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Priority
// ═══════════════════════════════════════════════════════════════════════════════

/// Priority level for jobs. Higher priorities are claimed first; jobs of equal
/// priority are claimed in enqueue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Submission
// ═══════════════════════════════════════════════════════════════════════════════

/// A job as submitted by a producer. Tier is left unset; it is resolved when
/// the first attempt starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub stage: String,
    pub duration_estimate_minutes: f64,
    #[serde(default)]
    pub priority: JobPriority,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl NewJob {
    pub fn new(stage: impl Into<String>, duration_estimate_minutes: f64) -> Self {
        Self {
            stage: stage.into(),
            duration_estimate_minutes,
            priority: JobPriority::default(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Record
// ═══════════════════════════════════════════════════════════════════════════════

/// The queue's record of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub stage: String,
    pub duration_estimate_minutes: f64,
    pub priority: JobPriority,
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Tier of the most recent or next attempt; unset until first started
    pub current_tier: Option<usize>,
    /// Retries consumed at `current_tier`
    pub attempts_at_current_tier: u32,
    /// Number of tier increases so far
    pub escalations: u32,
    /// Attempts started across all tiers
    pub total_attempts: u32,
    /// Times the job came back from an expired lease
    pub lease_recoveries: u32,

    pub status: JobStatus,
    pub lease_expiry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) lease_token: Option<Uuid>,

    pub result: Option<serde_json::Value>,
    pub error: Option<String>,

    /// Position within its priority class; reassigned on every requeue
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub events: Vec<JobEvent>,
}

impl Job {
    pub(crate) fn from_submission(new: NewJob, seq: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            stage: new.stage,
            duration_estimate_minutes: new.duration_estimate_minutes,
            priority: new.priority,
            payload: new.payload,
            current_tier: None,
            attempts_at_current_tier: 0,
            escalations: 0,
            total_attempts: 0,
            lease_recoveries: 0,
            status: JobStatus::Pending,
            lease_expiry: None,
            lease_token: None,
            result: None,
            error: None,
            seq,
            created_at: now,
            updated_at: now,
            finished_at: None,
            events: vec![JobEvent::new(now, JobEventKind::Queued)],
        }
    }

    /// True when no attempt has consumed a retry or escalation yet, so the
    /// tier must be resolved from the current routing config.
    pub fn needs_initial_routing(&self) -> bool {
        self.escalations == 0 && self.attempts_at_current_tier == 0
    }

    pub(crate) fn record(&mut self, now: DateTime<Utc>, kind: JobEventKind) {
        self.updated_at = now;
        self.events.push(JobEvent::new(now, kind));
    }

    pub(crate) fn release_lease(&mut self) {
        self.lease_expiry = None;
        self.lease_token = None;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Lease
// ═══════════════════════════════════════════════════════════════════════════════

/// Proof of a claim. Every lease-scoped queue call must present it; a stale
/// lease is rejected even if the same job has been reclaimed since.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub job_id: JobId,
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// History
// ═══════════════════════════════════════════════════════════════════════════════

/// One entry in a job's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: JobEventKind,
}

impl JobEvent {
    pub fn new(at: DateTime<Utc>, kind: JobEventKind) -> Self {
        Self { at, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEventKind {
    Queued,
    Claimed { lease_expiry: DateTime<Utc> },
    Started { tier: usize, attempt: u32 },
    Retried { tier: usize, attempts_at_tier: u32 },
    Escalated { from: Option<usize>, to: usize },
    Succeeded { tier: Option<usize> },
    Failed { error: String },
    LeaseRecovered { recoveries: u32 },
    Paused,
    Resumed,
    Cancelled,
}

impl JobEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Claimed { .. } => "claimed",
            Self::Started { .. } => "started",
            Self::Retried { .. } => "retried",
            Self::Escalated { .. } => "escalated",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::LeaseRecovered { .. } => "lease_recovered",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(JobStatus::Running.is_leased());
        assert!(!JobStatus::Pending.is_leased());
        assert!(!JobStatus::Paused.is_terminal());
        assert!(!JobStatus::Paused.is_leased());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Running".parse::<JobStatus>().unwrap(), JobStatus::Running);
        assert_eq!("paused".parse::<JobStatus>().unwrap(), JobStatus::Paused);
        assert!("dead".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_priority_order() {
        assert!(JobPriority::Critical > JobPriority::High);
        assert!(JobPriority::Normal > JobPriority::Low);
        assert_eq!(JobPriority::default(), JobPriority::Normal);
    }

    #[test]
    fn test_new_job_is_unrouted() {
        let job = Job::from_submission(NewJob::new("seo", 12.0), 0, Utc::now());
        assert_eq!(job.current_tier, None);
        assert!(job.needs_initial_routing());
        assert_eq!(job.events.len(), 1);
        assert_eq!(job.events[0].kind.name(), "queued");
    }

    #[test]
    fn test_event_serialization() {
        let event = JobEvent::new(Utc::now(), JobEventKind::Escalated { from: Some(0), to: 1 });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "escalated");
        assert_eq!(json["to"], 1);
    }
}
