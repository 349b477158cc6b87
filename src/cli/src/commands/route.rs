//! Routing preview.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;
use tierflow_core::routing::{explain, Resolution, RoutingConfig};

use crate::output::{self, Notice, OutputFormat};

#[derive(Args)]
pub struct RouteArgs {
    /// Estimated job duration in minutes
    #[arg(short, long)]
    pub minutes: f64,

    /// Stage to route; all configured stages when omitted
    #[arg(short, long)]
    pub stage: Option<String>,
}

#[derive(Debug, Serialize, Tabled)]
pub(crate) struct RouteRow {
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Base")]
    base_tier: usize,
    #[tabled(rename = "By Duration")]
    duration_tier: usize,
    #[tabled(rename = "Tier")]
    effective_tier: usize,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Model")]
    model: String,
}

impl From<Resolution> for RouteRow {
    fn from(r: Resolution) -> Self {
        Self {
            stage: r.stage,
            base_tier: r.base_tier,
            duration_tier: r.duration_tier,
            effective_tier: r.effective_tier,
            label: r.label,
            model: r.model,
        }
    }
}

/// Resolve one stage, or every configured stage in name order.
pub(crate) fn resolve_rows(
    routing: &RoutingConfig,
    stage: Option<&str>,
    minutes: f64,
) -> Result<Vec<RouteRow>> {
    let stages: Vec<&str> = match stage {
        Some(stage) => vec![stage],
        None => routing.base_tier_by_stage.keys().map(String::as_str).collect(),
    };
    stages
        .into_iter()
        .map(|stage| {
            explain(stage, minutes, routing)
                .map(RouteRow::from)
                .with_context(|| format!("Cannot route stage '{}'", stage))
        })
        .collect()
}

pub fn execute(args: RouteArgs, settings_path: &Path, format: OutputFormat) -> Result<()> {
    let (settings, _) = super::load_settings(settings_path)?;
    let rows = resolve_rows(&settings.routing, args.stage.as_deref(), args.minutes)?;

    if let OutputFormat::Table = format {
        output::notice(
            Notice::Info,
            &format!("Routing for an estimated {} minutes", args.minutes),
        );
    }
    output::print_list(&rows, format)
}
