//! Transcript duration estimate and the resulting per-stage tiers.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tierflow_core::jobs::{transcript_metrics, TranscriptMetrics, DEFAULT_WORDS_PER_MINUTE};

use super::route::{resolve_rows, RouteRow};
use crate::output::{self, Details, OutputFormat};

#[derive(Args)]
pub struct EstimateArgs {
    /// Transcript file, or `-` for stdin
    pub file: PathBuf,

    /// Speaking rate used for the estimate
    #[arg(long, default_value_t = DEFAULT_WORDS_PER_MINUTE)]
    pub wpm: u32,
}

#[derive(Serialize)]
struct EstimateReport {
    metrics: TranscriptMetrics,
    routes: Vec<RouteRow>,
}

fn read_transcript(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read transcript from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

pub fn execute(args: EstimateArgs, settings_path: &Path, format: OutputFormat) -> Result<()> {
    let text = read_transcript(&args.file)?;
    let metrics = transcript_metrics(&text, args.wpm);
    let (settings, _) = super::load_settings(settings_path)?;
    let routes = resolve_rows(&settings.routing, None, metrics.estimated_duration_minutes)?;

    match format {
        OutputFormat::Table => {
            output::section("Transcript");
            Details::new()
                .row("Words", metrics.word_count)
                .row(
                    "Estimated duration",
                    format!("{} min", metrics.estimated_duration_minutes),
                )
                .row("Long form", if metrics.is_long_form { "yes" } else { "no" })
                .print();
            output::section("Routing");
            output::print_list(&routes, format)
        }
        _ => output::print_item(&EstimateReport { metrics, routes }, format),
    }
}
