//! Queue snapshot inspection.
//!
//! Reads the snapshot file a file-backed worker keeps. The snapshot is a
//! point-in-time copy; a running worker may have moved on since.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;
use tierflow_core::jobs::{snapshot, Job, JobEvent, JobEventKind, JobId, JobStatus, QueueState};

use crate::output::{self, Details, Notice, OutputFormat};

#[derive(Subcommand)]
pub enum JobsCommands {
    /// List jobs, highest priority and oldest first
    List {
        /// Filter by status (pending, paused, claimed, running, succeeded, failed, cancelled)
        #[arg(short, long)]
        status: Option<JobStatus>,

        /// Maximum number of results
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show one job
    Show {
        /// Job ID
        job_id: JobId,
    },

    /// Show a job's history
    Events {
        /// Job ID
        job_id: JobId,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct JobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Attempts")]
    total_attempts: u32,
    #[tabled(rename = "Escalations")]
    escalations: u32,
    #[tabled(rename = "Created")]
    created_at: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            stage: job.stage.clone(),
            status: job.status.to_string(),
            priority: job.priority.to_string(),
            tier: output::or_dash(job.current_tier),
            total_attempts: job.total_attempts,
            escalations: job.escalations,
            created_at: job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct EventRow {
    #[tabled(rename = "Time")]
    at: String,
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

fn describe(kind: &JobEventKind) -> String {
    match kind {
        JobEventKind::Queued
        | JobEventKind::Paused
        | JobEventKind::Resumed
        | JobEventKind::Cancelled => String::new(),
        JobEventKind::Claimed { lease_expiry } => {
            format!("lease until {}", lease_expiry.format("%H:%M:%S"))
        }
        JobEventKind::Started { tier, attempt } => format!("tier {}, attempt {}", tier, attempt),
        JobEventKind::Retried {
            tier,
            attempts_at_tier,
        } => format!("tier {}, retry {}", tier, attempts_at_tier),
        JobEventKind::Escalated { from, to } => {
            format!("tier {} -> {}", output::or_dash(*from), to)
        }
        JobEventKind::Succeeded { tier } => format!("tier {}", output::or_dash(*tier)),
        JobEventKind::Failed { error } => error.clone(),
        JobEventKind::LeaseRecovered { recoveries } => format!("recovery {}", recoveries),
    }
}

impl From<&JobEvent> for EventRow {
    fn from(event: &JobEvent) -> Self {
        Self {
            at: event.at.format("%Y-%m-%d %H:%M:%S").to_string(),
            event: event.kind.name().to_string(),
            detail: describe(&event.kind),
        }
    }
}

fn load_state(path: &Path) -> Result<QueueState> {
    let snapshot = snapshot::read(path)
        .with_context(|| format!("Failed to read queue snapshot {}", path.display()))?;
    Ok(QueueState::from_snapshot(snapshot))
}

pub fn execute(cmd: JobsCommands, queue_path: &Path, format: OutputFormat) -> Result<()> {
    let state = load_state(queue_path)?;

    match cmd {
        JobsCommands::List { status, limit } => {
            let jobs = state.list(status, limit);
            match format {
                OutputFormat::Table => {
                    let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
                    output::print_list(&rows, format)?;
                    let stats = state.stats();
                    let summary = format!(
                        "{} pending, {} paused, {} leased, {} succeeded, {} failed, {} cancelled",
                        stats.pending,
                        stats.paused,
                        stats.claimed + stats.running,
                        stats.succeeded,
                        stats.failed,
                        stats.cancelled
                    );
                    output::notice(Notice::Info, &summary);
                }
                _ => output::print_item(&jobs, format)?,
            }
        }

        JobsCommands::Show { job_id } => {
            let job = state
                .get(job_id)
                .with_context(|| format!("Job {} not found", job_id))?;

            match format {
                OutputFormat::Table => {
                    output::section(&format!("Job {}", job.id));
                    Details::new()
                        .row("Stage", &job.stage)
                        .row("Status", job.status)
                        .row("Priority", job.priority)
                        .row(
                            "Estimated duration",
                            format!("{} min", job.duration_estimate_minutes),
                        )
                        .maybe("Tier", job.current_tier)
                        .row("Attempts at tier", job.attempts_at_current_tier)
                        .row("Total attempts", job.total_attempts)
                        .row("Escalations", job.escalations)
                        .row("Lease recoveries", job.lease_recoveries)
                        .maybe("Lease expiry", job.lease_expiry)
                        .row("Created", job.created_at.to_rfc3339())
                        .maybe("Finished", job.finished_at)
                        .some("Error", job.error.as_ref())
                        .some("Result", job.result.as_ref())
                        .print();
                }
                _ => output::print_item(job, format)?,
            }
        }

        JobsCommands::Events { job_id } => {
            let events = state
                .events(job_id)
                .with_context(|| format!("Job {} not found", job_id))?;

            match format {
                OutputFormat::Table => {
                    let rows: Vec<EventRow> = events.iter().map(EventRow::from).collect();
                    output::print_list(&rows, format)?;
                }
                _ => output::print_item(&events, format)?,
            }
        }
    }

    Ok(())
}
