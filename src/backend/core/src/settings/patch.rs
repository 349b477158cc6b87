//! Partial updates for the settings documents.
//!
//! Merge rules: `tiers` and `duration_thresholds` replace wholesale,
//! `base_tier_by_stage` merges key by key, escalation and worker fields
//! merge one field at a time. Merging never validates; the store does that
//! on the merged result.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::WorkerConfig;
use crate::routing::{DurationThreshold, EscalationPolicy, RoutingConfig, TierTable};

/// Partial [`RoutingConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiers: Option<TierTable>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_tier_by_stage: Option<BTreeMap<String, usize>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_thresholds: Option<Vec<DurationThreshold>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationPatch>,
}

impl RoutingPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tiers(mut self, tiers: TierTable) -> Self {
        self.tiers = Some(tiers);
        self
    }

    pub fn with_base_tier(mut self, stage: impl Into<String>, tier: usize) -> Self {
        self.base_tier_by_stage
            .get_or_insert_with(BTreeMap::new)
            .insert(stage.into(), tier);
        self
    }

    pub fn with_duration_thresholds(mut self, thresholds: Vec<DurationThreshold>) -> Self {
        self.duration_thresholds = Some(thresholds);
        self
    }

    pub fn with_escalation(mut self, escalation: EscalationPatch) -> Self {
        self.escalation = Some(escalation);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merge onto `base`, producing a new config.
    pub fn apply(&self, base: &RoutingConfig) -> RoutingConfig {
        let mut merged = base.clone();
        if let Some(tiers) = &self.tiers {
            merged.tiers = tiers.clone();
        }
        if let Some(stages) = &self.base_tier_by_stage {
            for (stage, tier) in stages {
                merged.base_tier_by_stage.insert(stage.clone(), *tier);
            }
        }
        if let Some(thresholds) = &self.duration_thresholds {
            merged.duration_thresholds = thresholds.clone();
        }
        if let Some(escalation) = &self.escalation {
            merged.escalation = escalation.apply(&base.escalation);
        }
        merged
    }
}

/// Partial [`EscalationPolicy`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EscalationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_timeout: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries_per_tier: Option<u32>,
}

impl EscalationPatch {
    pub fn apply(&self, base: &EscalationPolicy) -> EscalationPolicy {
        EscalationPolicy {
            enabled: self.enabled.unwrap_or(base.enabled),
            on_failure: self.on_failure.unwrap_or(base.on_failure),
            on_timeout: self.on_timeout.unwrap_or(base.on_timeout),
            timeout_seconds: self.timeout_seconds.unwrap_or(base.timeout_seconds),
            max_retries_per_tier: self.max_retries_per_tier.unwrap_or(base.max_retries_per_tier),
        }
    }
}

/// Partial [`WorkerConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_jobs: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_seconds: Option<u64>,
}

impl WorkerPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent_jobs(mut self, n: usize) -> Self {
        self.max_concurrent_jobs = Some(n);
        self
    }

    pub fn with_poll_interval_seconds(mut self, secs: u64) -> Self {
        self.poll_interval_seconds = Some(secs);
        self
    }

    pub fn with_heartbeat_interval_seconds(mut self, secs: u64) -> Self {
        self.heartbeat_interval_seconds = Some(secs);
        self
    }

    pub fn apply(&self, base: &WorkerConfig) -> WorkerConfig {
        WorkerConfig {
            max_concurrent_jobs: self.max_concurrent_jobs.unwrap_or(base.max_concurrent_jobs),
            poll_interval_seconds: self.poll_interval_seconds.unwrap_or(base.poll_interval_seconds),
            heartbeat_interval_seconds: self
                .heartbeat_interval_seconds
                .unwrap_or(base.heartbeat_interval_seconds),
        }
    }
}
