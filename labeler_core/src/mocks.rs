//! In-memory collaborators for tests, benches and dry runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use labeler_traits::{BoxError, EpcSource, LabelJob, LabelPrinter, Reading, WeightSource};

use crate::epc::EpcCode;
use crate::record::{RecordStore, WeightRecord};

/// Record store backed by a `Vec`. Can be told to fail appends.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<WeightRecord>>,
    fail_appends: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryRecordStore {
    fn append(&self, record: &WeightRecord) -> Result<(), BoxError> {
        if self.fail_appends.load(Ordering::Relaxed) {
            return Err(Box::new(std::io::Error::other("memory store rejects appends")));
        }
        self.records
            .lock()
            .map_err(|_| std::io::Error::other("memory store poisoned"))?
            .push(record.clone());
        Ok(())
    }

    fn take_all_pending(&self) -> Result<Vec<WeightRecord>, BoxError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| std::io::Error::other("memory store poisoned"))?;
        Ok(std::mem::take(&mut *guard))
    }
}

/// Monotonic EPC source starting after `start`. Optionally fails every call.
#[derive(Debug)]
pub struct CountingEpcSource {
    prefix: String,
    counter: Arc<AtomicU64>,
    fail: bool,
}

impl CountingEpcSource {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            counter: Arc::new(AtomicU64::new(0)),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(crate::DEFAULT_EPC_PREFIX)
        }
    }

    /// Shared view of the counter for assertions.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.counter)
    }
}

impl Default for CountingEpcSource {
    fn default() -> Self {
        Self::new(crate::DEFAULT_EPC_PREFIX)
    }
}

impl EpcSource for CountingEpcSource {
    fn generate_next(&mut self) -> Result<String, BoxError> {
        if self.fail {
            return Err(Box::new(std::io::Error::other("epc source offline")));
        }
        let next = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(EpcCode::create(&self.prefix, next)?.into_string())
    }
}

/// Printer that records every job, optionally after a delay or with failure.
#[derive(Debug, Default)]
pub struct RecordingPrinter {
    jobs: Mutex<Vec<LabelJob>>,
    delay: Duration,
    fail: bool,
}

impl RecordingPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn jobs(&self) -> Vec<LabelJob> {
        self.jobs.lock().map(|j| j.clone()).unwrap_or_default()
    }
}

impl LabelPrinter for RecordingPrinter {
    fn print(&self, job: &LabelJob) -> Result<(), BoxError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail {
            return Err(Box::new(std::io::Error::other("printer offline")));
        }
        self.jobs
            .lock()
            .map_err(|_| std::io::Error::other("printer poisoned"))?
            .push(job.clone());
        Ok(())
    }
}

/// Weight source that replays a fixed list of values, then reports end of stream.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    values: VecDeque<Result<f64, String>>,
    unit: String,
}

impl ScriptedSource {
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            values: values.into_iter().map(Ok).collect(),
            unit: "kg".into(),
        }
    }

    /// Insert a read error at the current end of the script.
    pub fn push_error(&mut self, msg: &str) {
        self.values.push_back(Err(msg.to_string()));
    }

    pub fn push(&mut self, value: f64) {
        self.values.push_back(Ok(value));
    }
}

impl WeightSource for ScriptedSource {
    fn read(&mut self, _timeout: Duration) -> Result<Option<Reading>, BoxError> {
        match self.values.pop_front() {
            Some(Ok(v)) => Ok(Some(Reading::new(v, self.unit.clone(), false))),
            Some(Err(msg)) => Err(Box::new(std::io::Error::other(msg))),
            None => Ok(None),
        }
    }
}
