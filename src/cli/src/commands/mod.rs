pub mod config;
pub mod estimate;
pub mod jobs;
pub mod route;

use anyhow::{Context, Result};
use std::path::Path;
use tierflow_core::settings::{store::read_settings, Settings};

/// Read the settings document, or the defaults if it does not exist yet.
pub(crate) fn load_settings(path: &Path) -> Result<(Settings, bool)> {
    let loaded = read_settings(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    Ok(match loaded {
        Some(settings) => (settings, true),
        None => (Settings::default(), false),
    })
}
