//! Subcommand bodies: batch run, drain and self-check.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;
use eyre::WrapErr;
use labeler_config::{Config, IngestMode};
use labeler_core::{BatchService, DomainEvent, Ingest, StatsSnapshot};
use labeler_hardware::{DeviceFilePrinter, LogPrinter, ReplayScale, SimulatedScale};
use labeler_store::{FileEpcGenerator, JsonlRecordStore};
use labeler_traits::{LabelPrinter, MonotonicClock};
use serde_json::json;

use crate::error_fmt::CliError;

const POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct RunOpts {
    pub product: Option<String>,
    pub batch_id: Option<String>,
    pub trace: Option<PathBuf>,
    pub placement_min_weight: Option<f64>,
    pub events: bool,
}

fn printer_for(cfg: &Config) -> Arc<dyn LabelPrinter> {
    match cfg.printer.device.as_deref() {
        Some(path) => Arc::new(DeviceFilePrinter::new(path)),
        None => Arc::new(LogPrinter),
    }
}

fn emit_event(ev: &DomainEvent, stream: bool) -> eyre::Result<()> {
    if stream {
        println!("{}", serde_json::to_string(ev)?);
    }
    Ok(())
}

/// Run one batch to completion and print a summary.
pub fn run_batch(cfg: &Config, opts: &RunOpts, json_out: bool) -> eyre::Result<()> {
    let product = opts
        .product
        .clone()
        .or_else(|| cfg.batch.product_id.clone())
        .ok_or_else(|| CliError::Usage("no product id: pass --product or set batch.product_id".into()))?;
    let batch_id = opts
        .batch_id
        .clone()
        .unwrap_or_else(|| chrono::Local::now().format("B%Y%m%d-%H%M%S").to_string());
    let placement = opts
        .placement_min_weight
        .unwrap_or(cfg.batch.placement_min_weight);
    if !(placement.is_finite() && placement > cfg.fsm.empty_threshold) {
        return Err(CliError::Usage(format!(
            "placement_min_weight {placement} must exceed fsm.empty_threshold {}",
            cfg.fsm.empty_threshold
        ))
        .into());
    }

    let data_dir = Path::new(&cfg.storage.data_dir);
    let store = Arc::new(JsonlRecordStore::open(data_dir).map_err(CliError::from)?);
    let epc = FileEpcGenerator::open(data_dir, &cfg.storage.epc_prefix).map_err(CliError::from)?;

    let (tap_tx, tap_rx) = xch::unbounded::<DomainEvent>();
    let service = BatchService::builder()
        .with_epc_source(epc)
        .with_record_store(Arc::clone(&store) as Arc<dyn labeler_core::RecordStore>)
        .with_printer(printer_for(cfg))
        .with_fsm_config((&cfg.fsm).into())
        .with_stability_config((&cfg.stability).into())
        .with_print_flow(cfg.printer.flow.into())
        .event_tap(tap_tx)
        .build()?;
    let handle = service.handle();

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .wrap_err("failed to install Ctrl-C handler")?;
    }

    handle.start_batch(&batch_id, &product, placement)?;

    let timeout = Duration::from_millis(cfg.scale.read_timeout_ms);
    let ingest = if let Some(path) = &opts.trace {
        // Replay sleeps the recorded gaps itself.
        let scale = ReplayScale::from_csv(path, MonotonicClock::new())?;
        Ingest::spawn_event(scale, handle.clone(), timeout, MonotonicClock::new())
    } else {
        let scale = SimulatedScale::from_config(&cfg.simulation, &cfg.scale)?;
        if cfg.scale.mode == IngestMode::Event {
            tracing::warn!("simulator has no device pacing; using paced ingestion");
        }
        Ingest::spawn(
            scale,
            handle.clone(),
            cfg.scale.sample_rate_hz,
            timeout,
            MonotonicClock::new(),
        )
    };

    let stall_warn_ms = cfg.scale.stall_warn_ms;
    let mut stall_reported = false;
    while !ingest.is_finished() && !interrupted.load(Ordering::SeqCst) {
        match tap_rx.recv_timeout(POLL) {
            Ok(ev) => emit_event(&ev, opts.events)?,
            Err(xch::RecvTimeoutError::Timeout) => {}
            Err(xch::RecvTimeoutError::Disconnected) => break,
        }
        let stalled = ingest.stalled_for_now();
        if stall_warn_ms > 0 && stalled >= stall_warn_ms {
            if !stall_reported {
                tracing::warn!(stalled_ms = stalled, "no scale reading forwarded recently");
                stall_reported = true;
            }
        } else {
            stall_reported = false;
        }
    }
    if interrupted.load(Ordering::SeqCst) {
        tracing::info!("interrupted; stopping batch");
    }

    ingest.request_stop();
    let forwarded = ingest.forwarded();
    ingest.join();
    handle.flush()?;
    handle.stop_batch()?;
    let stats = service.shutdown();

    for ev in tap_rx.try_iter() {
        emit_event(&ev, opts.events)?;
    }

    let pending = store.pending_count().map_err(CliError::from)?;
    print_summary(&batch_id, &product, forwarded, pending, &stats, json_out);
    Ok(())
}

fn print_summary(
    batch_id: &str,
    product: &str,
    samples: u64,
    pending: usize,
    stats: &StatsSnapshot,
    json_out: bool,
) {
    if json_out {
        println!(
            "{}",
            json!({
                "summary": {
                    "batch_id": batch_id,
                    "product_id": product,
                    "samples": samples,
                    "pending_records": pending,
                    "stats": stats,
                }
            })
        );
    } else {
        println!(
            "Batch {batch_id} ({product}) complete: {} weighed, {} persisted, {} printed, {} print failures, {} lost",
            stats.stabilized, stats.persisted, stats.printed, stats.print_failures, stats.lost_labels
        );
        println!("Samples: {samples}, pending records: {pending}");
    }
}

/// Take every pending record and write it to stdout, one JSON object per line.
pub fn drain(cfg: &Config) -> eyre::Result<()> {
    let store = JsonlRecordStore::open(&cfg.storage.data_dir).map_err(CliError::from)?;
    let records = store.take_pending().map_err(CliError::from)?;
    for r in &records {
        println!("{}", serde_json::to_string(r)?);
    }
    tracing::info!(records = records.len(), "drain complete");
    Ok(())
}

/// Open storage and the EPC counter without allocating a code, and check the
/// printer target.
pub fn self_check(cfg: &Config, json_out: bool) -> eyre::Result<()> {
    let store = JsonlRecordStore::open(&cfg.storage.data_dir).map_err(CliError::from)?;
    let pending = store.pending_count().map_err(CliError::from)?;
    let epc = FileEpcGenerator::open(&cfg.storage.data_dir, &cfg.storage.epc_prefix)
        .map_err(CliError::from)?;

    let printer = match cfg.printer.device.as_deref() {
        Some(dev) => {
            let parent = Path::new(dev)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            if !parent.is_dir() {
                eyre::bail!("printer device {dev:?}: directory {parent:?} does not exist");
            }
            dev.to_string()
        }
        None => "log".to_string(),
    };

    if json_out {
        println!(
            "{}",
            json!({
                "status": "ok",
                "data_dir": cfg.storage.data_dir,
                "pending_records": pending,
                "epc_counter": epc.current(),
                "printer": printer,
            })
        );
    } else {
        println!("OK");
        println!("data dir: {} ({pending} pending)", cfg.storage.data_dir);
        println!("epc counter: {} (prefix {})", epc.current(), epc.prefix());
        println!("printer: {printer}");
    }
    Ok(())
}
