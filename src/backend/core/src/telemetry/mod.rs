//! Telemetry: structured logging and metrics.
//!
//! - **Logging**: `tracing` events rendered as JSON, pretty or compact text
//! - **Metrics**: counters, gauges and histograms through the `metrics` facade
//!
//! # Example
//!
//! ```rust,no_run
//! use tierflow_core::telemetry::{init_telemetry, LoggingConfig};
//!
//! init_telemetry(&LoggingConfig::default()).expect("Failed to initialize telemetry");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{register_metrics, JobMetrics, PoolMetrics};

/// Initialize logging and describe metrics.
pub fn init_telemetry(logging: &LoggingConfig) -> anyhow::Result<()> {
    init_logging(logging)?;
    register_metrics();
    tracing::debug!(format = ?logging.format, level = %logging.level, "Telemetry initialized");
    Ok(())
}
