//! Metric names and recording helpers.
//!
//! Recording goes through the `metrics` facade. Nothing is exported unless
//! the host process installs a recorder; without one every call is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::Once;

use crate::jobs::JobStatus;

static REGISTER: Once = Once::new();

/// Describe every metric this crate emits. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(register_metric_descriptions);
}

fn register_metric_descriptions() {
    // Queue metrics
    describe_counter!("tierflow_jobs_submitted_total", "Jobs accepted into the queue");
    describe_counter!(
        "tierflow_jobs_finished_total",
        "Jobs reaching a terminal status, by status"
    );
    describe_counter!(
        "tierflow_lease_recoveries_total",
        "Jobs returned to the queue after their lease expired"
    );

    // Attempt metrics
    describe_counter!(
        "tierflow_attempts_total",
        "Execution attempts by stage, tier and outcome"
    );
    describe_histogram!(
        "tierflow_attempt_duration_seconds",
        "Execution attempt duration in seconds"
    );
    describe_counter!(
        "tierflow_escalations_total",
        "Tier escalations by stage and tier transition"
    );

    // Pool metrics
    describe_gauge!("tierflow_active_slots", "Worker slots currently running an attempt");

    // Error metrics
    describe_counter!("tierflow_errors_total", "Errors by code and category");
}

/// Job lifecycle metrics.
pub struct JobMetrics;

impl JobMetrics {
    pub fn submitted(stage: &str) {
        counter!("tierflow_jobs_submitted_total", "stage" => stage.to_string()).increment(1);
    }

    pub fn finished(status: JobStatus) {
        counter!("tierflow_jobs_finished_total", "status" => status.to_string()).increment(1);
    }

    pub fn lease_recovered() {
        counter!("tierflow_lease_recoveries_total").increment(1);
    }

    /// Record one finished attempt.
    pub fn attempt(stage: &str, tier: usize, outcome: &'static str, duration_seconds: f64) {
        counter!(
            "tierflow_attempts_total",
            "stage" => stage.to_string(),
            "tier" => tier.to_string(),
            "outcome" => outcome,
        )
        .increment(1);

        histogram!("tierflow_attempt_duration_seconds", "tier" => tier.to_string())
            .record(duration_seconds);
    }

    pub fn escalated(stage: &str, from: usize, to: usize) {
        counter!(
            "tierflow_escalations_total",
            "stage" => stage.to_string(),
            "from" => from.to_string(),
            "to" => to.to_string(),
        )
        .increment(1);
    }
}

/// Worker pool gauges.
pub struct PoolMetrics;

impl PoolMetrics {
    pub fn set_active(active: u64) {
        gauge!("tierflow_active_slots").set(active as f64);
    }
}
