//! Queue snapshot files.
//!
//! The whole queue is written as one JSON document. Saves go to a `.tmp`
//! sibling first and are renamed into place, so a crash mid-write leaves the
//! previous snapshot intact.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::state::QueueSnapshot;
use crate::error::{Result, TierflowError};

/// Save a snapshot atomically (write to .tmp, then rename).
pub fn save(path: &Path, snapshot: &QueueSnapshot) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| TierflowError::storage(parent, e))?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path).map_err(|e| TierflowError::storage(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, snapshot)?;
        let file = writer
            .into_inner()
            .map_err(|e| TierflowError::storage(&tmp_path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| TierflowError::storage(&tmp_path, e))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| TierflowError::storage(path, e))?;
    Ok(())
}

/// Load a snapshot if one exists.
///
/// A corrupt file is moved to `.bak` and `Ok(None)` is returned so the queue
/// can start empty.
pub fn load(path: &Path) -> Result<Option<QueueSnapshot>> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path).map_err(|e| TierflowError::storage(path, e))?;
    match serde_json::from_reader(BufReader::new(file)) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(e) => {
            let bak_path = backup_path(path);
            warn!(
                error = %e,
                path = %path.display(),
                bak = %bak_path.display(),
                "Corrupt queue snapshot, moving to .bak and starting empty",
            );
            fs::rename(path, &bak_path).map_err(|e| TierflowError::storage(&bak_path, e))?;
            Ok(None)
        }
    }
}

/// Read a snapshot without touching the file, for inspection tools.
pub fn read(path: &Path) -> Result<QueueSnapshot> {
    let file = File::open(path).map_err(|e| TierflowError::storage(path, e))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn backup_path(path: &Path) -> PathBuf {
    path.with_extension("bak")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::state::QueueState;
    use crate::jobs::NewJob;
    use chrono::Utc;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let mut state = QueueState::new();
        state
            .enqueue(NewJob::new("analyst", 3.0), 10, Utc::now())
            .unwrap();
        save(&path, &state.snapshot()).unwrap();

        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded.jobs.len(), 1);
        assert_eq!(loaded.jobs[0].stage, "analyst");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, b"{ not json").unwrap();

        assert!(load(&path).unwrap().is_none());
        assert!(!path.exists());
        assert!(path.with_extension("bak").exists());
    }
}
