//! Copy-on-write settings store with optional TOML persistence.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{RoutingPatch, Settings, WorkerConfig, WorkerPatch};
use crate::error::{Result, TierflowError};
use crate::routing::RoutingConfig;

/// An immutable settings value tagged with the store version that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub updated_at: DateTime<Utc>,
    pub value: T,
}

impl<T> Versioned<T> {
    fn new(version: u64, value: T) -> Self {
        Self {
            version,
            updated_at: Utc::now(),
            value,
        }
    }
}

impl<T> Deref for Versioned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Holds the current routing and worker settings.
///
/// Reads are lock-free apart from cloning an `Arc` under a read lock.
/// Patches are serialized by a writer mutex, so merge, validate, persist and
/// swap happen as one step.
#[derive(Debug)]
pub struct ConfigStore {
    routing: RwLock<Arc<Versioned<RoutingConfig>>>,
    worker: RwLock<Arc<Versioned<WorkerConfig>>>,
    writer: Mutex<u64>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// Create a store from validated settings, without persistence.
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self::from_parts(settings, None))
    }

    /// Store holding the built-in defaults.
    pub fn in_memory() -> Self {
        Self::from_parts(Settings::default(), None)
    }

    /// Load settings from `path`, falling back to defaults if the file does
    /// not exist. Successful patches are written back to the same file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = match read_settings(&path)? {
            Some(settings) => {
                settings.validate()?;
                tracing::info!(path = %path.display(), "Loaded settings");
                settings
            }
            None => {
                tracing::info!(path = %path.display(), "No settings file, using defaults");
                Settings::default()
            }
        };
        Ok(Self::from_parts(settings, Some(path)))
    }

    fn from_parts(settings: Settings, path: Option<PathBuf>) -> Self {
        Self {
            routing: RwLock::new(Arc::new(Versioned::new(0, settings.routing))),
            worker: RwLock::new(Arc::new(Versioned::new(0, settings.worker))),
            writer: Mutex::new(0),
            path,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Current routing snapshot. Hold on to it for the duration of a decision.
    pub fn routing(&self) -> Arc<Versioned<RoutingConfig>> {
        self.routing.read().clone()
    }

    pub fn get_routing(&self) -> RoutingConfig {
        self.routing().value.clone()
    }

    pub fn worker(&self) -> Arc<Versioned<WorkerConfig>> {
        self.worker.read().clone()
    }

    pub fn get_worker(&self) -> WorkerConfig {
        self.worker().value.clone()
    }

    /// Number of successful patches applied since the store was created.
    pub fn version(&self) -> u64 {
        *self.writer.lock()
    }

    pub fn settings(&self) -> Settings {
        Settings {
            routing: self.get_routing(),
            worker: self.get_worker(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// True when the stored worker settings differ from what a running pool
    /// started with.
    pub fn restart_required(&self, running: &WorkerConfig) -> bool {
        self.worker().value != *running
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Merge, validate, persist and publish a routing patch.
    ///
    /// On any error the stored config is left untouched.
    pub fn patch_routing(&self, patch: &RoutingPatch) -> Result<RoutingConfig> {
        let mut version = self.writer.lock();
        let merged = patch.apply(&self.routing.read().value);
        merged.validate()?;

        if let Some(path) = &self.path {
            let settings = Settings {
                routing: merged.clone(),
                worker: self.worker.read().value.clone(),
            };
            write_settings(path, &settings)?;
        }

        *version += 1;
        *self.routing.write() = Arc::new(Versioned::new(*version, merged.clone()));
        tracing::info!(version = *version, "Routing settings updated");
        Ok(merged)
    }

    /// Merge, validate, persist and publish a worker patch.
    ///
    /// A running pool keeps the values it started with; see
    /// [`ConfigStore::restart_required`].
    pub fn patch_worker(&self, patch: &WorkerPatch) -> Result<WorkerConfig> {
        let mut version = self.writer.lock();
        let merged = patch.apply(&self.worker.read().value);
        merged.validate()?;

        if let Some(path) = &self.path {
            let settings = Settings {
                routing: self.routing.read().value.clone(),
                worker: merged.clone(),
            };
            write_settings(path, &settings)?;
        }

        *version += 1;
        *self.worker.write() = Arc::new(Versioned::new(*version, merged.clone()));
        tracing::info!(
            version = *version,
            max_concurrent_jobs = merged.max_concurrent_jobs,
            "Worker settings updated; takes effect after restart"
        );
        Ok(merged)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Persistence
// ═══════════════════════════════════════════════════════════════════════════════

/// Read a settings file. Returns `Ok(None)` if it does not exist.
pub fn read_settings(path: &Path) -> Result<Option<Settings>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|e| TierflowError::storage(path, e))?;
    let settings: Settings = toml::from_str(&text)?;
    Ok(Some(settings))
}

/// Write a settings file atomically (write to .tmp, then rename).
pub fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| TierflowError::storage(parent, e))?;
    }

    let text = toml::to_string_pretty(settings)?;
    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path).map_err(|e| TierflowError::storage(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(text.as_bytes())
            .map_err(|e| TierflowError::storage(&tmp_path, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| TierflowError::storage(&tmp_path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| TierflowError::storage(&tmp_path, e))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| TierflowError::storage(path, e))?;
    Ok(())
}
