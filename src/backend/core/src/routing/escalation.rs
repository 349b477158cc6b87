//! Retry/escalation decision for a failed or timed-out attempt.
//!
//! [`decide`] is a pure function. Success never reaches it: the worker
//! finalizes successful jobs directly, and [`FailureKind`] has no success
//! variant.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::TIMEOUT_SECONDS_RANGE;
use crate::error::ConfigError;

/// Process-wide retry and escalation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Master switch; when off every job gets a single attempt
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Retry/escalate when the backend reports an error
    #[serde(default = "default_true")]
    pub on_failure: bool,

    /// Retry/escalate when an attempt exceeds its deadline
    #[serde(default = "default_true")]
    pub on_timeout: bool,

    /// Per-attempt deadline
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Same-tier retries before moving up
    #[serde(default = "default_max_retries_per_tier")]
    pub max_retries_per_tier: u32,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            on_failure: default_true(),
            on_timeout: default_true(),
            timeout_seconds: default_timeout_seconds(),
            max_retries_per_tier: default_max_retries_per_tier(),
        }
    }
}

fn default_true() -> bool { true }
fn default_timeout_seconds() -> u64 { 120 }
fn default_max_retries_per_tier() -> u32 { 1 }

impl EscalationPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !TIMEOUT_SECONDS_RANGE.contains(&self.timeout_seconds) {
            return Err(ConfigError::out_of_range(
                "escalation.timeout_seconds",
                self.timeout_seconds,
                format!(
                    "{}..={}",
                    TIMEOUT_SECONDS_RANGE.start(),
                    TIMEOUT_SECONDS_RANGE.end()
                ),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }

    fn covers(&self, kind: FailureKind) -> bool {
        match kind {
            FailureKind::Failure => self.on_failure,
            FailureKind::Timeout => self.on_timeout,
        }
    }
}

/// Unsuccessful attempt outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Failure,
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failure => write!(f, "failure"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Why a job stops being retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GiveUpReason {
    EscalationDisabled,
    NotEligible(FailureKind),
    TopTierExhausted,
}

impl fmt::Display for GiveUpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EscalationDisabled => write!(f, "escalation disabled"),
            Self::NotEligible(kind) => write!(f, "escalation not enabled for {}", kind),
            Self::TopTierExhausted => write!(f, "retries exhausted at the highest tier"),
        }
    }
}

/// What to do after an unsuccessful attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Requeue at the same tier with the attempt counter incremented
    RetrySameTier,
    /// Requeue one tier up with the attempt counter reset
    EscalateTo(usize),
    /// Finalize the job as failed
    GiveUp(GiveUpReason),
}

/// Decide the next step for a job.
///
/// `attempts_at_current_tier` counts retries already consumed at
/// `current_tier`, not including the attempt that just ended.
pub fn decide(
    kind: FailureKind,
    current_tier: usize,
    attempts_at_current_tier: u32,
    max_tier: usize,
    policy: &EscalationPolicy,
) -> Decision {
    if !policy.enabled {
        return Decision::GiveUp(GiveUpReason::EscalationDisabled);
    }
    if !policy.covers(kind) {
        return Decision::GiveUp(GiveUpReason::NotEligible(kind));
    }
    if attempts_at_current_tier < policy.max_retries_per_tier {
        return Decision::RetrySameTier;
    }
    if current_tier < max_tier {
        return Decision::EscalateTo(current_tier + 1);
    }
    Decision::GiveUp(GiveUpReason::TopTierExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = EscalationPolicy::default();
        assert!(policy.enabled && policy.on_failure && policy.on_timeout);
        assert_eq!(policy.timeout_seconds, 120);
        assert_eq!(policy.max_retries_per_tier, 1);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_retry_then_escalate() {
        let policy = EscalationPolicy::default();
        assert_eq!(
            decide(FailureKind::Failure, 0, 0, 2, &policy),
            Decision::RetrySameTier
        );
        assert_eq!(
            decide(FailureKind::Failure, 0, 1, 2, &policy),
            Decision::EscalateTo(1)
        );
    }

    #[test]
    fn test_give_up_at_top_tier() {
        let policy = EscalationPolicy::default();
        assert_eq!(
            decide(FailureKind::Timeout, 2, 1, 2, &policy),
            Decision::GiveUp(GiveUpReason::TopTierExhausted)
        );
    }

    #[test]
    fn test_disabled_policy() {
        let policy = EscalationPolicy {
            enabled: false,
            ..Default::default()
        };
        assert_eq!(
            decide(FailureKind::Failure, 0, 0, 2, &policy),
            Decision::GiveUp(GiveUpReason::EscalationDisabled)
        );
    }

    #[test]
    fn test_ineligible_failure_class() {
        let policy = EscalationPolicy {
            on_timeout: false,
            ..Default::default()
        };
        assert_eq!(
            decide(FailureKind::Timeout, 0, 0, 2, &policy),
            Decision::GiveUp(GiveUpReason::NotEligible(FailureKind::Timeout))
        );
        assert_eq!(
            decide(FailureKind::Failure, 0, 0, 2, &policy),
            Decision::RetrySameTier
        );
    }

    #[test]
    fn test_timeout_range() {
        let policy = EscalationPolicy {
            timeout_seconds: 29,
            ..Default::default()
        };
        assert!(matches!(
            policy.validate(),
            Err(ConfigError::OutOfRangeValue { .. })
        ));
    }
}
