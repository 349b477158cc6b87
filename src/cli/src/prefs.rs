//! Persistent CLI preferences stored in `~/.tierflow/config.toml`.
//!
//! Only default file locations live here; routing and worker settings are
//! in the settings document itself.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const SETTINGS_PATH_KEY: &str = "settings-path";
pub const QUEUE_PATH_KEY: &str = "queue-path";
pub const KNOWN_KEYS: [&str; 2] = [SETTINGS_PATH_KEY, QUEUE_PATH_KEY];

const DEFAULT_SETTINGS_PATH: &str = "tierflow.toml";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CliPrefs {
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

fn prefs_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".tierflow").join("config.toml"))
}

/// Load preferences, returning defaults if the file does not exist.
pub fn load() -> Result<CliPrefs> {
    let path = prefs_path()?;
    if !path.exists() {
        return Ok(CliPrefs::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Save preferences, creating the directory if needed.
pub fn save(prefs: &CliPrefs) -> Result<PathBuf> {
    let path = prefs_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(prefs).context("Failed to serialize preferences")?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Settings document location: flag/env, then preference, then `./tierflow.toml`.
pub fn settings_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let prefs = load()?;
    Ok(prefs
        .values
        .get(SETTINGS_PATH_KEY)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH)))
}

/// Queue snapshot location: flag/env, then preference.
pub fn queue_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    load()?
        .values
        .get(QUEUE_PATH_KEY)
        .map(PathBuf::from)
        .context("No queue snapshot given; pass --queue or run `tierflow config set queue-path <file>`")
}
