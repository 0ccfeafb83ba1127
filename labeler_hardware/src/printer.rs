//! Label printers: a device-file writer and a log-only fallback.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use labeler_traits::{BoxError, LabelJob, LabelPrinter};

use crate::error::HwError;

/// Plain-text label body. One field per line, form feed at the end.
pub fn render_label(job: &LabelJob, printed_at: DateTime<Local>) -> String {
    format!(
        "PRODUCT {}\nWEIGHT  {:.3} {}\nEPC     {}\nDATE    {}\n\x0c",
        job.product_id,
        job.weight,
        job.unit,
        job.epc_code,
        printed_at.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Writes each rendered label to a character device (e.g. `/dev/usb/lp0`) or
/// any appendable file. Writes are serialized so labels never interleave.
#[derive(Debug)]
pub struct DeviceFilePrinter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DeviceFilePrinter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_label(&self, body: &str) -> Result<(), HwError> {
        let device = |source| HwError::Device {
            path: self.path.clone(),
            source,
        };
        let _g = self
            .lock
            .lock()
            .map_err(|_| device(std::io::Error::other("printer lock poisoned")))?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(device)?;
        f.write_all(body.as_bytes()).and_then(|()| f.flush()).map_err(device)
    }
}

impl LabelPrinter for DeviceFilePrinter {
    fn print(&self, job: &LabelJob) -> Result<(), BoxError> {
        let body = render_label(job, Local::now());
        self.write_label(&body)?;
        tracing::debug!(device = %self.path.display(), epc = %job.epc_code, "label written");
        Ok(())
    }
}

/// Used when no printer device is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPrinter;

impl LabelPrinter for LogPrinter {
    fn print(&self, job: &LabelJob) -> Result<(), BoxError> {
        tracing::info!(
            product_id = %job.product_id,
            weight = job.weight,
            unit = %job.unit,
            epc = %job.epc_code,
            "label (no printer device)"
        );
        Ok(())
    }
}
