//! Stage + estimated duration → starting tier.

use serde::Serialize;

use super::{DurationThreshold, RoutingConfig};
use crate::error::ConfigError;

/// Tier of the first threshold whose bound covers `minutes`.
///
/// An empty list maps everything to tier 0. Non-positive and NaN durations
/// land in the smallest bucket.
pub fn duration_tier(minutes: f64, thresholds: &[DurationThreshold]) -> usize {
    let minutes = if minutes.is_nan() { 0.0 } else { minutes.max(0.0) };
    thresholds
        .iter()
        .find(|t| t.max_minutes.map_or(true, |max| minutes <= max))
        .or_else(|| thresholds.last())
        .map(|t| t.tier)
        .unwrap_or(0)
}

/// Effective starting tier: `max(base_tier_by_stage[stage], duration_tier)`.
pub fn resolve_tier(
    stage: &str,
    duration_minutes: f64,
    config: &RoutingConfig,
) -> Result<usize, ConfigError> {
    explain(stage, duration_minutes, config).map(|r| r.effective_tier)
}

/// Breakdown of a routing decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub stage: String,
    pub duration_minutes: f64,
    pub base_tier: usize,
    pub duration_tier: usize,
    pub effective_tier: usize,
    pub label: String,
    pub model: String,
}

/// Resolve a tier and report how it was reached.
pub fn explain(
    stage: &str,
    duration_minutes: f64,
    config: &RoutingConfig,
) -> Result<Resolution, ConfigError> {
    let base_tier = *config
        .base_tier_by_stage
        .get(stage)
        .ok_or_else(|| ConfigError::UnknownStage {
            stage: stage.to_string(),
        })?;
    let by_duration = duration_tier(duration_minutes, &config.duration_thresholds);
    let effective_tier = base_tier.max(by_duration);
    let tier = config.tiers.check(effective_tier)?;

    Ok(Resolution {
        stage: stage.to_string(),
        duration_minutes,
        base_tier,
        duration_tier: by_duration,
        effective_tier,
        label: tier.label.clone(),
        model: tier.model.clone(),
    })
}
