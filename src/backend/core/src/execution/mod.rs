//! Execution backend capability.
//!
//! The worker pool does not know how work is performed; it hands each attempt
//! to an [`ExecutionBackend`] together with the tier to run it on and a
//! deadline. Outcomes are values, not errors: a failure or timeout feeds the
//! escalation policy.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::jobs::JobId;
use crate::routing::Tier;

pub use http::{HttpBackendConfig, HttpExecutionBackend};

/// One attempt to run a job.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub job_id: JobId,
    pub stage: String,
    pub tier: Tier,
    pub payload: serde_json::Value,
    /// Time the backend has before the attempt counts as a timeout
    pub deadline: Duration,
    /// 1-based attempt number across all tiers
    pub attempt: u32,
}

/// Result of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success(serde_json::Value),
    Failure(String),
    Timeout,
}

impl ExecutionOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Failure(_) => "failure",
            Self::Timeout => "timeout",
        }
    }

    /// Human-readable description of an unsuccessful outcome.
    pub fn describe(&self, deadline: Duration) -> String {
        match self {
            Self::Success(_) => "succeeded".to_string(),
            Self::Failure(message) => message.clone(),
            Self::Timeout => format!("timed out after {}s", deadline.as_secs()),
        }
    }
}

/// Something that can run an attempt at a given tier.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome;
}
