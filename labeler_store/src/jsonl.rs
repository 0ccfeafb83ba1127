//! Append-only JSON-lines record store.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use labeler_core::{RecordStore, WeightRecord};
use labeler_traits::BoxError;

use crate::error::StoreError;

pub const RECORDS_FILE: &str = "weight-records.jsonl";
pub const SYNCED_DIR: &str = "synced";

/// One JSON object per line in `<dir>/weight-records.jsonl`.
///
/// A single mutex covers both `append` and `take_all_pending`, so a take
/// either sees a record or leaves it for the next take.
#[derive(Debug)]
pub struct JsonlRecordStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonlRecordStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn records_path(&self) -> PathBuf {
        self.dir.join(RECORDS_FILE)
    }

    pub fn synced_dir(&self) -> PathBuf {
        self.dir.join(SYNCED_DIR)
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.lock.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn append_record(&self, record: &WeightRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let path = self.records_path();
        let _g = self.guard()?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        f.write_all(line.as_bytes())
            .and_then(|()| f.sync_data())
            .map_err(|e| StoreError::io(&path, e))
    }

    /// Read every pending record and rotate the file into `synced/`.
    ///
    /// Malformed lines are skipped with a warning; they stay in the rotated
    /// file for inspection.
    pub fn take_pending(&self) -> Result<Vec<WeightRecord>, StoreError> {
        let path = self.records_path();
        let _g = self.guard()?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let records = read_records(&path)?;

        let synced = self.synced_dir();
        fs::create_dir_all(&synced).map_err(|e| StoreError::io(&synced, e))?;
        let target = rotation_target(&synced);
        fs::rename(&path, &target).map_err(|e| StoreError::io(&path, e))?;
        tracing::info!(
            records = records.len(),
            rotated_to = %target.display(),
            "pending records taken"
        );
        Ok(records)
    }

    /// Number of non-empty lines waiting in the pending file.
    pub fn pending_count(&self) -> Result<usize, StoreError> {
        let path = self.records_path();
        let _g = self.guard()?;
        if !path.exists() {
            return Ok(0);
        }
        let f = fs::File::open(&path).map_err(|e| StoreError::io(&path, e))?;
        let mut n = 0;
        for line in BufReader::new(f).lines() {
            let line = line.map_err(|e| StoreError::io(&path, e))?;
            if !line.trim().is_empty() {
                n += 1;
            }
        }
        Ok(n)
    }
}

fn read_records(path: &Path) -> Result<Vec<WeightRecord>, StoreError> {
    let f = fs::File::open(path).map_err(|e| StoreError::io(path, e))?;
    let mut out = Vec::new();
    for (idx, line) in BufReader::new(f).lines().enumerate() {
        let line = line.map_err(|e| StoreError::io(path, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<WeightRecord>(trimmed) {
            Ok(r) => out.push(r),
            Err(e) => tracing::warn!(line = idx + 1, error = %e, "skipping malformed record"),
        }
    }
    Ok(out)
}

// Millisecond stamps can collide on back-to-back takes.
fn rotation_target(synced: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S-%3f").to_string();
    let first = synced.join(format!("records-{stamp}.jsonl"));
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| synced.join(format!("records-{stamp}-{n}.jsonl")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

impl RecordStore for JsonlRecordStore {
    fn append(&self, record: &WeightRecord) -> Result<(), BoxError> {
        Ok(self.append_record(record)?)
    }

    fn take_all_pending(&self) -> Result<Vec<WeightRecord>, BoxError> {
        Ok(self.take_pending()?)
    }
}
