//! Settings document management.
//!
//! Patches go through the same merge-validate-persist path the worker uses,
//! so an invalid patch leaves the file untouched.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;
use tierflow_core::settings::{ConfigStore, RoutingPatch, Settings, WorkerPatch};

use crate::output::{self, Details, Notice, OutputFormat};
use crate::prefs;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective settings
    Show,

    /// Check the settings document against every routing and worker rule
    Validate,

    /// Apply a partial routing update, e.g. '{"base_tier_by_stage": {"seo": 1}}'
    PatchRouting {
        /// Patch as JSON
        patch: String,
    },

    /// Apply a partial worker update, e.g. '{"max_concurrent_jobs": 4}'
    PatchWorker {
        /// Patch as JSON
        patch: String,
    },

    /// Set a CLI preference (settings-path, queue-path)
    Set {
        /// Preference key
        key: String,
        /// Value to set
        value: String,
    },
}

#[derive(Serialize, Tabled)]
struct TierRow {
    #[tabled(rename = "Tier")]
    index: usize,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Model")]
    model: String,
}

#[derive(Serialize, Tabled)]
struct StageRow {
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Base Tier")]
    tier: usize,
    #[tabled(rename = "Label")]
    label: String,
}

#[derive(Serialize, Tabled)]
struct ThresholdRow {
    #[tabled(rename = "Up To (min)")]
    max_minutes: String,
    #[tabled(rename = "Tier")]
    tier: usize,
}

fn print_settings(settings: &Settings, format: OutputFormat) -> Result<()> {
    let OutputFormat::Table = format else {
        return output::print_item(settings, format);
    };

    let routing = &settings.routing;
    let tiers: Vec<TierRow> = routing
        .tiers
        .iter()
        .map(|t| TierRow {
            index: t.index,
            label: t.label.clone(),
            model: t.model.clone(),
        })
        .collect();
    let stages: Vec<StageRow> = routing
        .base_tier_by_stage
        .iter()
        .map(|(stage, tier)| StageRow {
            stage: stage.clone(),
            tier: *tier,
            label: routing.tiers.label(*tier),
        })
        .collect();
    let thresholds: Vec<ThresholdRow> = routing
        .duration_thresholds
        .iter()
        .map(|t| ThresholdRow {
            max_minutes: output::or_dash(t.max_minutes),
            tier: t.tier,
        })
        .collect();

    output::section("Tiers");
    output::print_list(&tiers, format)?;
    output::section("Stages");
    output::print_list(&stages, format)?;
    output::section("Duration thresholds");
    output::print_list(&thresholds, format)?;

    let escalation = &routing.escalation;
    output::section("Escalation");
    Details::new()
        .row("Enabled", escalation.enabled)
        .row("On failure", escalation.on_failure)
        .row("On timeout", escalation.on_timeout)
        .row("Timeout", format!("{}s", escalation.timeout_seconds))
        .row("Retries per tier", escalation.max_retries_per_tier)
        .print();

    let worker = &settings.worker;
    output::section("Worker");
    Details::new()
        .row("Max concurrent jobs", worker.max_concurrent_jobs)
        .row("Poll interval", format!("{}s", worker.poll_interval_seconds))
        .row("Heartbeat interval", format!("{}s", worker.heartbeat_interval_seconds))
        .row("Lease", format!("{}s", worker.lease_duration().as_secs()))
        .print();
    Ok(())
}

pub fn execute(cmd: ConfigCommands, settings_path: &Path, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let (settings, exists) = super::load_settings(settings_path)?;
            if !exists {
                let msg = format!("{} does not exist; showing defaults", settings_path.display());
                output::notice(Notice::Warn, &msg);
            }
            print_settings(&settings, format)?;
        }

        ConfigCommands::Validate => {
            let (settings, exists) = super::load_settings(settings_path)?;
            if !exists {
                bail!("{} does not exist", settings_path.display());
            }
            settings
                .validate()
                .with_context(|| format!("{} is invalid", settings_path.display()))?;
            output::notice(Notice::Ok, &format!("{} is valid", settings_path.display()));
        }

        ConfigCommands::PatchRouting { patch } => {
            let patch: RoutingPatch =
                serde_json::from_str(&patch).context("Invalid routing patch")?;
            if patch.is_empty() {
                bail!("Routing patch is empty");
            }
            let store = ConfigStore::open(settings_path)?;
            let routing = store.patch_routing(&patch).context("Routing patch rejected")?;

            match format {
                OutputFormat::Table => {
                    let msg = format!("Routing updated in {}", settings_path.display());
                    output::notice(Notice::Ok, &msg);
                }
                _ => output::print_item(&routing, format)?,
            }
        }

        ConfigCommands::PatchWorker { patch } => {
            let patch: WorkerPatch =
                serde_json::from_str(&patch).context("Invalid worker patch")?;
            let store = ConfigStore::open(settings_path)?;
            let worker = store.patch_worker(&patch).context("Worker patch rejected")?;

            match format {
                OutputFormat::Table => {
                    let msg = format!("Worker settings updated in {}", settings_path.display());
                    output::notice(Notice::Ok, &msg);
                    output::notice(Notice::Info, "Running workers pick this up on restart.");
                }
                _ => output::print_item(&worker, format)?,
            }
        }

        ConfigCommands::Set { key, value } => {
            if !prefs::KNOWN_KEYS.contains(&key.as_str()) {
                bail!(
                    "Unknown preference '{}'; expected one of: {}",
                    key,
                    prefs::KNOWN_KEYS.join(", ")
                );
            }
            let mut cli_prefs = prefs::load()?;
            cli_prefs.values.insert(key.clone(), value.clone());
            let path = prefs::save(&cli_prefs)?;

            match format {
                OutputFormat::Table => {
                    let msg = format!("{} = {} (saved to {})", key, value, path.display());
                    output::notice(Notice::Ok, &msg);
                }
                _ => output::print_item(&serde_json::json!({ "key": key, "value": value }), format)?,
            }
        }
    }

    Ok(())
}
