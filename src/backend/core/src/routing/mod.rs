//! Duration-aware tier routing.
//!
//! A job's starting tier is the higher of its stage's base tier and the tier
//! its estimated duration maps to. When an attempt fails or times out, the
//! escalation policy decides whether to retry at the same tier, move one
//! tier up, or give up.
//!
//! - [`tier`]: the ordered tier table
//! - [`resolver`]: stage + duration → tier
//! - [`escalation`]: failure → next step

pub mod escalation;
pub mod resolver;
pub mod tier;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ConfigError;

pub use escalation::{decide, Decision, EscalationPolicy, FailureKind, GiveUpReason};
pub use resolver::{duration_tier, explain, resolve_tier, Resolution};
pub use tier::{Tier, TierTable};

/// Allowed range for `escalation.timeout_seconds`.
pub const TIMEOUT_SECONDS_RANGE: std::ops::RangeInclusive<u64> = 30..=300;

/// Maps an estimated duration cutoff to a minimum tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationThreshold {
    /// Inclusive upper bound in minutes; `None` is the catch-all bucket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_minutes: Option<f64>,
    pub tier: usize,
}

impl DurationThreshold {
    pub fn bounded(max_minutes: f64, tier: usize) -> Self {
        Self {
            max_minutes: Some(max_minutes),
            tier,
        }
    }

    pub fn unbounded(tier: usize) -> Self {
        Self {
            max_minutes: None,
            tier,
        }
    }
}

/// Routing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Available tiers, cheapest first
    #[serde(default)]
    pub tiers: TierTable,

    /// Starting tier per pipeline stage
    #[serde(default = "default_base_tier_by_stage")]
    pub base_tier_by_stage: BTreeMap<String, usize>,

    /// Ascending duration cutoffs, ending with one unbounded entry
    #[serde(default = "default_duration_thresholds")]
    pub duration_thresholds: Vec<DurationThreshold>,

    /// Retry/escalation behaviour
    #[serde(default)]
    pub escalation: EscalationPolicy,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            tiers: TierTable::default(),
            base_tier_by_stage: default_base_tier_by_stage(),
            duration_thresholds: default_duration_thresholds(),
            escalation: EscalationPolicy::default(),
        }
    }
}

fn default_base_tier_by_stage() -> BTreeMap<String, usize> {
    [
        ("analyst", 0),
        ("formatter", 0),
        ("seo", 0),
        ("manager", 2),
        ("copy_editor", 0),
    ]
    .into_iter()
    .map(|(stage, tier)| (stage.to_string(), tier))
    .collect()
}

fn default_duration_thresholds() -> Vec<DurationThreshold> {
    vec![
        DurationThreshold::bounded(15.0, 0),
        DurationThreshold::bounded(30.0, 1),
        DurationThreshold::unbounded(2),
    ]
}

impl RoutingConfig {
    pub fn max_tier(&self) -> usize {
        self.tiers.max_tier()
    }

    /// Check every structural and numeric rule. The first violation wins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tiers.validate()?;
        let max_tier = self.max_tier();

        for (stage, &tier) in &self.base_tier_by_stage {
            if stage.trim().is_empty() {
                return Err(ConfigError::InvariantViolation(
                    "stage names must not be empty".to_string(),
                ));
            }
            if tier > max_tier {
                return Err(ConfigError::TierOutOfRange { tier, max_tier });
            }
        }

        validate_thresholds(&self.duration_thresholds, max_tier)?;
        self.escalation.validate()
    }
}

/// Threshold rules: exactly one trailing unbounded entry, strictly ascending
/// positive bounds, non-decreasing tiers that exist in the table.
pub fn validate_thresholds(
    thresholds: &[DurationThreshold],
    max_tier: usize,
) -> Result<(), ConfigError> {
    let Some((last, bounded)) = thresholds.split_last() else {
        return Ok(());
    };

    if last.max_minutes.is_some() {
        return Err(ConfigError::InvariantViolation(
            "the last duration threshold must be unbounded".to_string(),
        ));
    }

    let mut previous_max: Option<f64> = None;
    for (i, threshold) in bounded.iter().enumerate() {
        let Some(max) = threshold.max_minutes else {
            return Err(ConfigError::InvariantViolation(format!(
                "duration threshold {} is unbounded but is not the last entry",
                i
            )));
        };
        if !max.is_finite() || max <= 0.0 {
            return Err(ConfigError::out_of_range(
                format!("duration_thresholds[{}].max_minutes", i),
                max,
                "> 0",
            ));
        }
        if let Some(prev) = previous_max {
            if max <= prev {
                return Err(ConfigError::InvariantViolation(format!(
                    "duration thresholds must be strictly ascending ({} follows {})",
                    max, prev
                )));
            }
        }
        previous_max = Some(max);
    }

    let mut previous_tier = 0;
    for threshold in thresholds {
        if threshold.tier > max_tier {
            return Err(ConfigError::TierOutOfRange {
                tier: threshold.tier,
                max_tier,
            });
        }
        if threshold.tier < previous_tier {
            return Err(ConfigError::InvariantViolation(format!(
                "threshold tiers must be non-decreasing (tier {} follows tier {})",
                threshold.tier, previous_tier
            )));
        }
        previous_tier = threshold.tier;
    }

    Ok(())
}
