//! Replays a recorded `t,value,unit,stable` trace in real (or clock) time.

use std::path::Path;
use std::time::Duration;

use labeler_config::TraceRow;
use labeler_traits::{BoxError, Clock, Reading, WeightSource};

use crate::error::{HwError, Result};

/// Sleeps on `clock` for the recorded gap before returning each row, so the
/// service sees the original cadence. Meant for event-driven ingestion.
pub struct ReplayScale<C: Clock> {
    rows: std::vec::IntoIter<TraceRow>,
    clock: C,
    last_t: Option<f64>,
}

impl<C: Clock> ReplayScale<C> {
    pub fn new(rows: Vec<TraceRow>, clock: C) -> Self {
        Self {
            rows: rows.into_iter(),
            clock,
            last_t: None,
        }
    }

    pub fn from_csv(path: &Path, clock: C) -> Result<Self> {
        let rows = labeler_config::load_trace_csv(path).map_err(|e| HwError::Trace(e.to_string()))?;
        tracing::info!(path = %path.display(), rows = rows.len(), "trace loaded");
        Ok(Self::new(rows, clock))
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl<C: Clock> WeightSource for ReplayScale<C> {
    fn read(&mut self, _timeout: Duration) -> std::result::Result<Option<Reading>, BoxError> {
        let Some(row) = self.rows.next() else {
            return Ok(None);
        };
        if let Some(prev) = self.last_t {
            let gap = row.t - prev;
            if gap > 0.0 {
                self.clock.sleep(Duration::from_secs_f64(gap));
            }
        }
        self.last_t = Some(row.t);
        Ok(Some(Reading::new(row.value, row.unit, row.stable)))
    }
}
