//! Comprehensive unit tests for tier routing and escalation decisions.
//!
//! Tests cover:
//! - Duration thresholds and stage base tiers
//! - Effective tier resolution and its error cases
//! - Escalation decisions for every policy switch
//! - Routing and escalation properties over generated inputs

use proptest::prelude::*;
use tierflow_core::error::ConfigError;
use tierflow_core::routing::{
    decide, duration_tier, explain, resolve_tier, validate_thresholds, Decision, DurationThreshold,
    EscalationPolicy, FailureKind, GiveUpReason, RoutingConfig, TierTable,
};

fn scenario_config() -> RoutingConfig {
    let mut config = RoutingConfig {
        duration_thresholds: vec![
            DurationThreshold::bounded(10.0, 0),
            DurationThreshold::bounded(30.0, 1),
            DurationThreshold::unbounded(2),
        ],
        ..RoutingConfig::default()
    };
    config.base_tier_by_stage.insert("analyst".to_string(), 0);
    config.base_tier_by_stage.insert("manager".to_string(), 2);
    config
}

// ============================================================================
// Resolver Tests
// ============================================================================

#[test]
fn test_resolve_concrete_scenario() {
    let config = scenario_config();
    assert_eq!(resolve_tier("analyst", 5.0, &config).unwrap(), 0);
    assert_eq!(resolve_tier("analyst", 25.0, &config).unwrap(), 1);
    assert_eq!(resolve_tier("analyst", 90.0, &config).unwrap(), 2);
}

#[test]
fn test_base_tier_dominates() {
    let config = scenario_config();
    for minutes in [0.0, 1.0, 15.0, 45.0, 600.0] {
        assert_eq!(resolve_tier("manager", minutes, &config).unwrap(), 2);
    }
}

#[test]
fn test_threshold_bound_is_inclusive() {
    let config = scenario_config();
    assert_eq!(resolve_tier("analyst", 10.0, &config).unwrap(), 0);
    assert_eq!(resolve_tier("analyst", 10.01, &config).unwrap(), 1);
    assert_eq!(resolve_tier("analyst", 30.0, &config).unwrap(), 1);
}

#[test]
fn test_non_positive_duration_is_smallest_bucket() {
    let config = scenario_config();
    assert_eq!(resolve_tier("analyst", 0.0, &config).unwrap(), 0);
    assert_eq!(resolve_tier("analyst", -12.0, &config).unwrap(), 0);
    assert_eq!(duration_tier(f64::NAN, &config.duration_thresholds), 0);
}

#[test]
fn test_empty_thresholds_map_to_tier_zero() {
    assert_eq!(duration_tier(500.0, &[]), 0);

    let config = RoutingConfig {
        duration_thresholds: Vec::new(),
        ..scenario_config()
    };
    assert_eq!(resolve_tier("analyst", 500.0, &config).unwrap(), 0);
}

#[test]
fn test_unknown_stage() {
    let err = resolve_tier("translator", 5.0, &scenario_config()).unwrap_err();
    assert_eq!(
        err,
        ConfigError::UnknownStage {
            stage: "translator".to_string()
        }
    );
}

#[test]
fn test_base_tier_out_of_range() {
    let mut config = scenario_config();
    config.base_tier_by_stage.insert("legacy".to_string(), 5);
    let err = resolve_tier("legacy", 1.0, &config).unwrap_err();
    assert_eq!(err, ConfigError::TierOutOfRange { tier: 5, max_tier: 2 });
}

#[test]
fn test_explain_reports_breakdown() {
    let resolution = explain("analyst", 25.0, &scenario_config()).unwrap();
    assert_eq!(resolution.base_tier, 0);
    assert_eq!(resolution.duration_tier, 1);
    assert_eq!(resolution.effective_tier, 1);
    assert_eq!(resolution.label, "default");
    assert_eq!(resolution.model, "@preset/default");
}

#[test]
fn test_resolution_uses_current_table() {
    let mut config = scenario_config();
    config.tiers = TierTable::from_labels(["small", "large"]).unwrap();
    config.duration_thresholds = vec![DurationThreshold::bounded(10.0, 0), DurationThreshold::unbounded(1)];
    config.base_tier_by_stage.insert("manager".to_string(), 1);

    let resolution = explain("analyst", 20.0, &config).unwrap();
    assert_eq!(resolution.effective_tier, 1);
    assert_eq!(resolution.model, "@preset/large");
}

// ============================================================================
// Threshold Validation Tests
// ============================================================================

#[test]
fn test_thresholds_must_end_unbounded() {
    let thresholds = vec![DurationThreshold::bounded(10.0, 0), DurationThreshold::bounded(20.0, 1)];
    assert!(matches!(
        validate_thresholds(&thresholds, 2),
        Err(ConfigError::InvariantViolation(_))
    ));
}

#[test]
fn test_thresholds_must_not_decrease_in_tier() {
    let thresholds = vec![
        DurationThreshold::bounded(10.0, 1),
        DurationThreshold::bounded(20.0, 0),
        DurationThreshold::unbounded(2),
    ];
    assert!(matches!(
        validate_thresholds(&thresholds, 2),
        Err(ConfigError::InvariantViolation(_))
    ));
}

#[test]
fn test_thresholds_must_ascend() {
    let thresholds = vec![
        DurationThreshold::bounded(20.0, 0),
        DurationThreshold::bounded(20.0, 1),
        DurationThreshold::unbounded(2),
    ];
    assert!(validate_thresholds(&thresholds, 2).is_err());
}

#[test]
fn test_threshold_tier_must_exist() {
    let thresholds = vec![DurationThreshold::bounded(10.0, 0), DurationThreshold::unbounded(3)];
    assert_eq!(
        validate_thresholds(&thresholds, 2),
        Err(ConfigError::TierOutOfRange { tier: 3, max_tier: 2 })
    );
}

#[test]
fn test_empty_thresholds_are_valid() {
    assert!(validate_thresholds(&[], 2).is_ok());
}

// ============================================================================
// Escalation Decision Tests
// ============================================================================

#[test]
fn test_retry_then_escalate() {
    let policy = EscalationPolicy::default();
    assert_eq!(policy.max_retries_per_tier, 1);

    // First failure at tier 0: one retry left
    assert_eq!(decide(FailureKind::Failure, 0, 0, 2, &policy), Decision::RetrySameTier);
    // Second failure: retry consumed, move up
    assert_eq!(decide(FailureKind::Failure, 0, 1, 2, &policy), Decision::EscalateTo(1));
}

#[test]
fn test_top_tier_exhausted() {
    let policy = EscalationPolicy::default();
    assert_eq!(
        decide(FailureKind::Timeout, 2, 1, 2, &policy),
        Decision::GiveUp(GiveUpReason::TopTierExhausted)
    );
}

#[test]
fn test_disabled_policy_gives_up() {
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
    assert_eq!(decide(FailureKind::Failure, 0, 0, 2, &policy), Decision::RetrySameTier);
}

#[test]
fn test_zero_retries_escalates_immediately() {
    let policy = EscalationPolicy {
        max_retries_per_tier: 0,
        ..Default::default()
    };
    assert_eq!(decide(FailureKind::Failure, 1, 0, 2, &policy), Decision::EscalateTo(2));
}

#[test]
fn test_timeout_range() {
    for (seconds, ok) in [(29, false), (30, true), (300, true), (301, false)] {
        let policy = EscalationPolicy {
            timeout_seconds: seconds,
            ..Default::default()
        };
        assert_eq!(policy.validate().is_ok(), ok, "timeout_seconds = {}", seconds);
    }
}

// ============================================================================
// Properties
// ============================================================================

prop_compose! {
    /// A threshold list that satisfies every validation rule.
    fn valid_thresholds(max_tier: usize)
        (steps in prop::collection::vec((0.5f64..60.0, 0usize..=1), 0..5), last_bump in 0usize..=1)
        -> Vec<DurationThreshold>
    {
        let mut bound = 0.0;
        let mut tier = 0;
        let mut thresholds = Vec::new();
        for (step, bump) in steps {
            bound += step;
            tier = (tier + bump).min(max_tier);
            thresholds.push(DurationThreshold::bounded(bound, tier));
        }
        thresholds.push(DurationThreshold::unbounded((tier + last_bump).min(max_tier)));
        thresholds
    }
}

proptest! {
    #[test]
    fn prop_generated_thresholds_validate(thresholds in valid_thresholds(2)) {
        prop_assert!(validate_thresholds(&thresholds, 2).is_ok());
    }

    #[test]
    fn prop_resolve_is_monotonic_in_duration(
        thresholds in valid_thresholds(2),
        base in 0usize..=2,
        a in -10.0f64..500.0,
        b in -10.0f64..500.0,
    ) {
        let mut config = RoutingConfig { duration_thresholds: thresholds, ..RoutingConfig::default() };
        config.base_tier_by_stage.insert("stage".to_string(), base);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

        let t_lo = resolve_tier("stage", lo, &config).unwrap();
        let t_hi = resolve_tier("stage", hi, &config).unwrap();
        prop_assert!(t_lo <= t_hi);
    }

    #[test]
    fn prop_resolve_never_below_base(
        thresholds in valid_thresholds(2),
        base in 0usize..=2,
        minutes in -10.0f64..500.0,
    ) {
        let mut config = RoutingConfig { duration_thresholds: thresholds, ..RoutingConfig::default() };
        config.base_tier_by_stage.insert("stage".to_string(), base);

        let tier = resolve_tier("stage", minutes, &config).unwrap();
        prop_assert!(tier >= base);
        prop_assert!(tier <= config.max_tier());
        // Same inputs, same answer
        prop_assert_eq!(tier, resolve_tier("stage", minutes, &config).unwrap());
    }

    #[test]
    fn prop_decide_never_exceeds_max_tier(
        timeout in any::<bool>(),
        max_tier in 0usize..6,
        tier_offset in 0usize..6,
        attempts in 0u32..5,
        retries in 0u32..4,
        enabled in any::<bool>(),
    ) {
        let current = tier_offset.min(max_tier);
        let kind = if timeout { FailureKind::Timeout } else { FailureKind::Failure };
        let policy = EscalationPolicy { enabled, max_retries_per_tier: retries, ..Default::default() };

        match decide(kind, current, attempts, max_tier, &policy) {
            Decision::EscalateTo(next) => {
                prop_assert_eq!(next, current + 1);
                prop_assert!(next <= max_tier);
            }
            Decision::RetrySameTier => prop_assert!(enabled && attempts < retries),
            Decision::GiveUp(_) => {}
        }
    }

    #[test]
    fn prop_disabled_always_gives_up(
        timeout in any::<bool>(),
        tier in 0usize..3,
        attempts in 0u32..10,
    ) {
        let kind = if timeout { FailureKind::Timeout } else { FailureKind::Failure };
        let policy = EscalationPolicy { enabled: false, ..Default::default() };
        prop_assert_eq!(
            decide(kind, tier, attempts, 2, &policy),
            Decision::GiveUp(GiveUpReason::EscalationDisabled)
        );
    }
}
