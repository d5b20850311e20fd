//! JSON file fallback for detections (§4.N), used when no sqlite path is
//! configured. Grounded on the teacher's `signals/storage.rs`
//! bounded-`VecDeque` in-memory store, generalized to a durable file: an
//! atomic write-temp-then-rename on every mutation, an on-startup load,
//! and archiving of evicted entries once the cap is hit rather than
//! silently dropping them.

use crate::error::{EngineError, EngineResult};
use crate::models::Detection;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const DEFAULT_CAP: usize = 5_000;

pub struct FileDetectionStore {
    path: PathBuf,
    archive_path: PathBuf,
    cap: usize,
    entries: RwLock<VecDeque<Detection>>,
}

impl FileDetectionStore {
    pub fn open(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::internal("create detection store directory", e))?;
        }
        let archive_path = archive_path_for(&path);
        let entries = if path.exists() {
            load(&path)?
        } else {
            VecDeque::new()
        };
        Ok(Self { path, archive_path, cap: DEFAULT_CAP, entries: RwLock::new(entries) })
    }

    pub fn record(&self, detection: Detection) -> EngineResult<()> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.iter_mut().find(|d| {
            d.strategy_id == detection.strategy_id && d.symbol == detection.symbol && d.direction == detection.direction
        }) {
            *existing = detection;
        } else {
            entries.push_back(detection);
        }

        let mut archived = Vec::new();
        while entries.len() > self.cap {
            if let Some(evicted) = entries.pop_front() {
                archived.push(evicted);
            }
        }
        let snapshot: Vec<Detection> = entries.iter().cloned().collect();
        drop(entries);

        if !archived.is_empty() {
            append_archive(&self.archive_path, &archived)?;
        }
        write_atomic(&self.path, &snapshot)
    }

    pub fn all(&self) -> Vec<Detection> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn by_symbol(&self, symbol: &str) -> Vec<Detection> {
        self.entries.read().iter().filter(|d| d.symbol == symbol).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Mirrors [`super::db::DetectionDb::expire_stale`]: flip eligible rows
    /// past their cooldown window to expired, then persist.
    pub fn expire_stale(&self, now: chrono::DateTime<chrono::Utc>) -> EngineResult<usize> {
        let mut changed = 0usize;
        {
            let mut entries = self.entries.write();
            for entry in entries.iter_mut() {
                if entry.status == crate::models::DetectionStatus::Eligible && entry.cooldown_ends_at < now {
                    entry.status = crate::models::DetectionStatus::Expired;
                    changed += 1;
                }
            }
        }
        if changed > 0 {
            let snapshot: Vec<Detection> = self.entries.read().iter().cloned().collect();
            write_atomic(&self.path, &snapshot)?;
        }
        Ok(changed)
    }
}

fn archive_path_for(path: &Path) -> PathBuf {
    let mut archive = path.to_path_buf();
    let stem = archive.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    archive.set_file_name(format!("{stem}.archive.jsonl"));
    archive
}

fn load(path: &Path) -> EngineResult<VecDeque<Detection>> {
    let data = fs::read_to_string(path).map_err(|e| EngineError::internal("read detection store", e))?;
    if data.trim().is_empty() {
        return Ok(VecDeque::new());
    }
    let entries: Vec<Detection> = serde_json::from_str(&data)?;
    Ok(entries.into())
}

/// Write-temp-then-rename so a crash mid-write never truncates the file.
fn write_atomic(path: &Path, entries: &[Detection]) -> EngineResult<()> {
    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_vec_pretty(entries)?;
    {
        let mut file = fs::File::create(&tmp_path).map_err(|e| EngineError::internal("create temp detection file", e))?;
        file.write_all(&json).map_err(|e| EngineError::internal("write temp detection file", e))?;
        file.sync_all().map_err(|e| EngineError::internal("sync temp detection file", e))?;
    }
    fs::rename(&tmp_path, path).map_err(|e| EngineError::internal("rename detection file", e))?;
    Ok(())
}

/// Evicted entries are never discarded — appended as one JSON line each so
/// the archive file can grow without a rewrite.
fn append_archive(path: &Path, entries: &[Detection]) -> EngineResult<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| EngineError::internal("open archive file", e))?;
    for entry in entries {
        let line = serde_json::to_string(entry)?;
        writeln!(file, "{line}").map_err(|e| EngineError::internal("write archive line", e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, DetectionStatus, Grade};
    use chrono::Utc;
    use tempfile::tempdir;

    fn sample(symbol: &str) -> Detection {
        let now = Utc::now();
        Detection {
            strategy_id: "bollinger-mr".into(),
            symbol: symbol.into(),
            direction: Direction::Long,
            status: DetectionStatus::Eligible,
            grade: Grade::A,
            confidence: 80.0,
            first_detected_at: now,
            last_detected_at: now,
            detection_count: 1,
            cooldown_ends_at: now,
            notes: None,
        }
    }

    #[test]
    fn record_then_reload_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("detections.json");
        let store = FileDetectionStore::open(&path).unwrap();
        store.record(sample("EURUSD")).unwrap();
        assert_eq!(store.len(), 1);

        let reopened = FileDetectionStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn same_key_updates_in_place_rather_than_appending() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("detections.json");
        let store = FileDetectionStore::open(&path).unwrap();
        store.record(sample("EURUSD")).unwrap();
        let mut updated = sample("EURUSD");
        updated.detection_count = 5;
        store.record(updated).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.all()[0].detection_count, 5);
    }

    #[test]
    fn eviction_past_cap_archives_rather_than_drops() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("detections.json");
        let store = FileDetectionStore { cap: 2, ..FileDetectionStore::open(&path).unwrap() };
        store.record(sample("A")).unwrap();
        store.record(sample("B")).unwrap();
        store.record(sample("C")).unwrap();
        assert_eq!(store.len(), 2);
        let archive = archive_path_for(&path);
        assert!(archive.exists());
    }
}
