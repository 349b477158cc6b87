//! Tierflow CLI - offline operator tool for Tierflow deployments.
//!
//! Previews routing decisions, edits the settings document and inspects
//! queue snapshots. It reads and writes files directly; no worker needs to
//! be running.

mod commands;
mod output;
mod prefs;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{config, estimate, jobs, route};
use output::OutputFormat;

/// Tierflow - tier routing and escalation engine CLI
#[derive(Parser)]
#[command(
    name = "tierflow",
    version,
    about = "Tierflow - tier routing and escalation engine",
    long_about = "Preview tier routing, manage routing and worker settings, and inspect job queue snapshots.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Settings document (routing + worker)
    #[arg(long, global = true, env = "TIERFLOW_SETTINGS")]
    settings: Option<PathBuf>,

    /// Queue snapshot file
    #[arg(long, global = true, env = "TIERFLOW_QUEUE")]
    queue: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Preview the starting tier for a stage and duration
    Route(route::RouteArgs),

    /// Estimate a transcript's duration and the tier each stage would get
    Estimate(estimate::EstimateArgs),

    /// Settings management
    #[command(subcommand)]
    Config(config::ConfigCommands),

    /// Inspect jobs in a queue snapshot
    #[command(subcommand)]
    Jobs(jobs::JobsCommands),
}

fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        output::notice(output::Notice::Error, &format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let format = cli.output;
    let settings_path = prefs::settings_path(cli.settings)?;

    match cli.command {
        Commands::Route(args) => route::execute(args, &settings_path, format),
        Commands::Estimate(args) => estimate::execute(args, &settings_path, format),
        Commands::Config(cmd) => config::execute(cmd, &settings_path, format),
        Commands::Jobs(cmd) => {
            let queue_path = prefs::queue_path(cli.queue)?;
            jobs::execute(cmd, &queue_path, format)
        }
    }
}
