//! File-backed monotonic EPC generator.

use std::fs;
use std::path::{Path, PathBuf};

use labeler_core::{EpcCode, EpcError, epc};
use labeler_traits::{BoxError, EpcSource};
use serde::{Deserialize, Serialize};

use crate::atomic::write_atomic;
use crate::error::StoreError;

pub const COUNTER_FILE: &str = "epc-counter.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CounterState {
    counter: u64,
}

/// Counter persisted to `<dir>/epc-counter.json` after every increment, so a
/// restart never reissues a code that was handed out.
#[derive(Debug)]
pub struct FileEpcGenerator {
    path: PathBuf,
    prefix: String,
    counter: u64,
}

impl FileEpcGenerator {
    pub fn open(dir: impl AsRef<Path>, prefix: &str) -> Result<Self, StoreError> {
        if !epc::is_valid_prefix(prefix) {
            return Err(EpcError::BadPrefix(prefix.to_string()).into());
        }
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        let path = dir.join(COUNTER_FILE);
        let counter = load_counter(&path);
        tracing::debug!(path = %path.display(), counter, "epc counter loaded");
        Ok(Self {
            path,
            prefix: prefix.to_ascii_uppercase(),
            counter,
        })
    }

    /// Last counter value handed out (0 if none yet).
    pub const fn current(&self) -> u64 {
        self.counter
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Allocate the next code. The counter is only advanced once the new
    /// value is on disk.
    pub fn next_code(&mut self) -> Result<EpcCode, StoreError> {
        let next = self.counter + 1;
        let code = EpcCode::create(&self.prefix, next)?;
        let bytes = serde_json::to_vec(&CounterState { counter: next })?;
        write_atomic(&self.path, &bytes).map_err(|e| StoreError::io(&self.path, e))?;
        self.counter = next;
        Ok(code)
    }
}

fn load_counter(path: &Path) -> u64 {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "epc counter unreadable; restarting from 0");
            return 0;
        }
    };
    match serde_json::from_slice::<CounterState>(&bytes) {
        Ok(s) => s.counter,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "epc counter corrupt; restarting from 0");
            0
        }
    }
}

impl EpcSource for FileEpcGenerator {
    fn generate_next(&mut self) -> Result<String, BoxError> {
        Ok(self.next_code()?.into_string())
    }
}
