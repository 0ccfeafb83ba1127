//! Batch processing service: owns the FSM on a dedicated thread and reacts to
//! its events.
//!
//! Two long-lived threads:
//! - the FSM actor, which is the only place FSM state is mutated. Hosts reach it
//!   through `ServiceHandle`, which sends `Command`s over a channel. With
//!   `PrintFlow::FastAcknowledge` it acknowledges a stabilization itself,
//!   before taking the next command, so queued samples never meet a `Locked`
//!   state that is waiting on I/O.
//! - the event consumer, which drains the FSM's event channel in order. On
//!   `WeightStabilized` it generates the EPC, persists the record, and finally
//!   hands the label to a short-lived print thread.
//!
//! Per-event failures are logged and counted; they never stop either loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::Utc;
use crossbeam_channel as xch;
use eyre::WrapErr;
use labeler_traits::clock::{Clock, MonotonicClock};
use labeler_traits::{EpcSource, LabelJob, LabelPrinter};
use serde::Serialize;

use crate::config::{FsmConfig, StabilityConfig};
use crate::error::{BuildError, LabelerError, Result};
use crate::event::{DomainEvent, EventKind};
use crate::fsm::BatchFsm;
use crate::record::{RecordStore, WeightRecord};
use crate::sample::WeightSample;
use crate::stability::StabilityDetector;
use crate::state::{BatchState, FsmSnapshot, PauseReason};

/// How long `shutdown` waits for in-flight print threads by default.
pub const DEFAULT_PRINT_GRACE: Duration = Duration::from_secs(2);

/// How the service moves the FSM out of `Locked` after a stabilization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrintFlow {
    /// The actor acknowledges in the same step that locked, before EPC
    /// generation and persistence. The printer outcome never feeds back into
    /// the FSM.
    #[default]
    FastAcknowledge,
    /// Keep the FSM in `Locked` until the printer reports back: success walks
    /// `Printing` → `PostGuard`, a printer failure pauses with `PrinterError`,
    /// an EPC or persistence failure with `StorageError`.
    Confirmed,
}

/// Messages accepted by the FSM actor. Processed strictly in send order.
#[derive(Debug)]
pub(crate) enum Command {
    Start {
        batch_id: String,
        product_id: String,
        placement_min_weight: f64,
    },
    Stop,
    ChangeProduct(String),
    Sample(WeightSample),
    AcknowledgePrint,
    CancelPrintRequest,
    ConfirmPrintSent(String),
    ConfirmPrintCompleted,
    Pause(PauseReason),
    Resume,
    /// Barrier: replied to once every earlier command has been applied.
    Flush(xch::Sender<()>),
    Shutdown,
}

// ── Statistics ──────────────────────────────────────────────────────────────

/// Lock-free counters updated by the consumer and print threads.
#[derive(Debug, Default)]
pub struct ServiceStats {
    stabilized: AtomicU64,
    persisted: AtomicU64,
    printed: AtomicU64,
    print_failures: AtomicU64,
    lost_labels: AtomicU64,
    handler_errors: AtomicU64,
    prints_in_flight: AtomicUsize,
}

/// Point-in-time copy of `ServiceStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub stabilized: u64,
    pub persisted: u64,
    pub printed: u64,
    pub print_failures: u64,
    pub lost_labels: u64,
    pub handler_errors: u64,
}

impl ServiceStats {
    pub fn stabilized(&self) -> u64 {
        self.stabilized.load(Ordering::Relaxed)
    }
    pub fn persisted(&self) -> u64 {
        self.persisted.load(Ordering::Relaxed)
    }
    pub fn printed(&self) -> u64 {
        self.printed.load(Ordering::Relaxed)
    }
    pub fn print_failures(&self) -> u64 {
        self.print_failures.load(Ordering::Relaxed)
    }
    pub fn lost_labels(&self) -> u64 {
        self.lost_labels.load(Ordering::Relaxed)
    }
    pub fn handler_errors(&self) -> u64 {
        self.handler_errors.load(Ordering::Relaxed)
    }
    pub fn prints_in_flight(&self) -> usize {
        self.prints_in_flight.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            stabilized: self.stabilized(),
            persisted: self.persisted(),
            printed: self.printed(),
            print_failures: self.print_failures(),
            lost_labels: self.lost_labels(),
            handler_errors: self.handler_errors(),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ── Handle ──────────────────────────────────────────────────────────────────

/// Cheap, cloneable entry point for hosts and the ingest thread.
#[derive(Clone)]
pub struct ServiceHandle {
    commands: xch::Sender<Command>,
    snapshot: Arc<ArcSwap<FsmSnapshot>>,
    stats: Arc<ServiceStats>,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
}

impl core::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("snapshot", &self.snapshot.load_full())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl ServiceHandle {
    fn send(&self, cmd: Command) -> Result<()> {
        self.commands
            .send(cmd)
            .map_err(|_| eyre::Report::new(LabelerError::Disconnected))
    }

    pub fn start_batch(
        &self,
        batch_id: &str,
        product_id: &str,
        placement_min_weight: f64,
    ) -> Result<()> {
        if !placement_min_weight.is_finite() || placement_min_weight < 0.0 {
            return Err(eyre::Report::new(LabelerError::Config(format!(
                "placement_min_weight must be finite and >= 0, got {placement_min_weight}"
            ))));
        }
        tracing::info!(batch_id, product_id, placement_min_weight, "starting batch");
        self.send(Command::Start {
            batch_id: batch_id.to_string(),
            product_id: product_id.to_string(),
            placement_min_weight,
        })
    }

    pub fn stop_batch(&self) -> Result<()> {
        tracing::info!("stopping batch");
        self.send(Command::Stop)
    }

    /// Only honored while the FSM waits for an empty platform.
    pub fn change_product(&self, product_id: &str) -> Result<()> {
        tracing::info!(product_id, "product change requested");
        self.send(Command::ChangeProduct(product_id.to_string()))
    }

    /// Stamp a reading with the service clock and forward it to the FSM.
    /// Non-finite values are dropped. A no-op while no batch is active.
    pub fn process_weight(&self, value: f64, unit: &str) -> Result<()> {
        let timestamp = self.clock.secs_since(self.epoch);
        self.process_sample(WeightSample::new(value, unit, timestamp))
    }

    /// Forward a pre-stamped sample (replay, deterministic tests).
    pub fn process_sample(&self, sample: WeightSample) -> Result<()> {
        if !sample.value.is_finite() || !sample.timestamp.is_finite() {
            tracing::debug!(value = sample.value, "dropping non-finite sample");
            return Ok(());
        }
        self.send(Command::Sample(sample))
    }

    /// Manual print path: `Locked` → `Printing`.
    pub fn confirm_print(&self, epc_code: &str) -> Result<()> {
        self.send(Command::ConfirmPrintSent(epc_code.to_string()))
    }

    /// Manual print path: `Printing` → `PostGuard`.
    pub fn complete_print(&self) -> Result<()> {
        self.send(Command::ConfirmPrintCompleted)
    }

    pub fn acknowledge_print(&self) -> Result<()> {
        self.send(Command::AcknowledgePrint)
    }

    /// Reprint: drop the pending request so the next steady sample re-issues it.
    pub fn cancel_print_request(&self) -> Result<()> {
        self.send(Command::CancelPrintRequest)
    }

    pub fn pause(&self, reason: PauseReason) -> Result<()> {
        tracing::info!(%reason, "pause requested");
        self.send(Command::Pause(reason))
    }

    pub fn resume(&self) -> Result<()> {
        tracing::info!("resume requested");
        self.send(Command::Resume)
    }

    /// Block until every command sent before this call has been applied.
    pub fn flush(&self) -> Result<()> {
        let (tx, rx) = xch::bounded(1);
        self.send(Command::Flush(tx))?;
        rx.recv()
            .map_err(|_| eyre::Report::new(LabelerError::Disconnected))
    }

    /// Latest published FSM view.
    pub fn snapshot(&self) -> Arc<FsmSnapshot> {
        self.snapshot.load_full()
    }

    pub fn state(&self) -> BatchState {
        self.snapshot.load().state
    }

    pub fn pause_reason(&self) -> PauseReason {
        self.snapshot.load().pause_reason
    }

    pub fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    /// Seconds since the service epoch, on the service clock.
    pub fn now_secs(&self) -> f64 {
        self.clock.secs_since(self.epoch)
    }
}

// ── Builder ─────────────────────────────────────────────────────────────────

pub struct BatchServiceBuilder {
    epc_source: Option<Box<dyn EpcSource>>,
    record_store: Option<Arc<dyn RecordStore>>,
    printer: Option<Arc<dyn LabelPrinter>>,
    fsm_cfg: FsmConfig,
    stability_cfg: StabilityConfig,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    taps: Vec<xch::Sender<DomainEvent>>,
    print_grace: Duration,
    print_flow: PrintFlow,
}

impl Default for BatchServiceBuilder {
    fn default() -> Self {
        Self {
            epc_source: None,
            record_store: None,
            printer: None,
            fsm_cfg: FsmConfig::default(),
            stability_cfg: StabilityConfig::default(),
            clock: None,
            taps: Vec::new(),
            print_grace: DEFAULT_PRINT_GRACE,
            print_flow: PrintFlow::default(),
        }
    }
}

impl BatchServiceBuilder {
    pub fn with_epc_source(mut self, source: impl EpcSource + 'static) -> Self {
        self.epc_source = Some(Box::new(source));
        self
    }

    pub fn with_record_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.record_store = Some(store);
        self
    }

    pub fn with_printer(mut self, printer: Arc<dyn LabelPrinter>) -> Self {
        self.printer = Some(printer);
        self
    }

    pub fn with_fsm_config(mut self, cfg: FsmConfig) -> Self {
        self.fsm_cfg = cfg;
        self
    }

    pub fn with_stability_config(mut self, cfg: StabilityConfig) -> Self {
        self.stability_cfg = cfg;
        self
    }

    /// Clock used to stamp `process_weight` samples. Defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Receive a copy of every event after the service has handled it.
    pub fn event_tap(mut self, tap: xch::Sender<DomainEvent>) -> Self {
        self.taps.push(tap);
        self
    }

    pub fn with_print_grace(mut self, grace: Duration) -> Self {
        self.print_grace = grace;
        self
    }

    pub fn with_print_flow(mut self, flow: PrintFlow) -> Self {
        self.print_flow = flow;
        self
    }

    pub fn build(self) -> Result<BatchService> {
        let epc_source = self
            .epc_source
            .ok_or_else(|| eyre::Report::new(BuildError::MissingEpcSource))?;
        let store = self
            .record_store
            .ok_or_else(|| eyre::Report::new(BuildError::MissingRecordStore))?;
        let printer = self
            .printer
            .ok_or_else(|| eyre::Report::new(BuildError::MissingPrinter))?;
        validate(&self.fsm_cfg, &self.stability_cfg)?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let epoch = clock.now();

        let (cmd_tx, cmd_rx) = xch::unbounded::<Command>();
        let (evt_tx, evt_rx) = xch::unbounded::<DomainEvent>();
        let snapshot = Arc::new(ArcSwap::from_pointee(FsmSnapshot::default()));
        let stats = Arc::new(ServiceStats::default());

        let fsm = BatchFsm::new(
            evt_tx,
            StabilityDetector::new(self.stability_cfg),
            self.fsm_cfg,
        );
        let actor_snapshot = Arc::clone(&snapshot);
        let flow = self.print_flow;
        let actor = std::thread::Builder::new()
            .name("labeler-fsm".into())
            .spawn(move || run_actor(fsm, flow, &cmd_rx, &actor_snapshot))
            .wrap_err("failed to spawn FSM thread")?;

        let orchestrator = Orchestrator {
            commands: cmd_tx.clone(),
            epc_source,
            store,
            printer,
            stats: Arc::clone(&stats),
            taps: self.taps,
            flow: self.print_flow,
        };
        let consumer = match std::thread::Builder::new()
            .name("labeler-events".into())
            .spawn(move || orchestrator.run(&evt_rx))
        {
            Ok(h) => h,
            Err(e) => {
                let _ = cmd_tx.send(Command::Shutdown);
                let _ = actor.join();
                return Err(eyre::Report::new(e).wrap_err("failed to spawn event thread"));
            }
        };

        Ok(BatchService {
            handle: ServiceHandle {
                commands: cmd_tx,
                snapshot,
                stats,
                clock,
                epoch,
            },
            actor: Some(actor),
            consumer: Some(consumer),
            print_grace: self.print_grace,
        })
    }
}

fn validate(fsm: &FsmConfig, stab: &StabilityConfig) -> Result<()> {
    let checks: [(bool, &'static str); 10] = [
        (
            fsm.settle_seconds.is_finite() && fsm.settle_seconds >= 0.0,
            "settle_seconds must be >= 0",
        ),
        (
            fsm.clear_seconds.is_finite() && fsm.clear_seconds > 0.0,
            "clear_seconds must be > 0",
        ),
        (fsm.min_samples >= 1, "fsm min_samples must be >= 1"),
        (
            fsm.empty_threshold.is_finite() && fsm.empty_threshold >= 0.0,
            "empty_threshold must be >= 0",
        ),
        (fsm.eps.is_finite() && fsm.eps >= 0.0, "eps must be >= 0"),
        (
            (0.0..=1.0).contains(&fsm.eps_align),
            "eps_align must be within [0, 1]",
        ),
        (
            stab.sigma.is_finite() && stab.sigma >= 0.0,
            "sigma must be >= 0",
        ),
        (
            stab.eps.is_finite() && stab.eps >= 0.0,
            "stability eps must be >= 0",
        ),
        (
            stab.window_seconds.is_finite() && stab.window_seconds > 0.0,
            "window_seconds must be > 0",
        ),
        (stab.min_samples >= 1, "stability min_samples must be >= 1"),
    ];
    for (ok, msg) in checks {
        if !ok {
            return Err(eyre::Report::new(BuildError::InvalidConfig(msg)));
        }
    }
    Ok(())
}

// ── Service ─────────────────────────────────────────────────────────────────

/// Running service. Dropping it shuts both threads down.
pub struct BatchService {
    handle: ServiceHandle,
    actor: Option<JoinHandle<()>>,
    consumer: Option<JoinHandle<()>>,
    print_grace: Duration,
}

impl core::fmt::Debug for BatchService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BatchService")
            .field("handle", &self.handle)
            .finish()
    }
}

impl BatchService {
    pub fn builder() -> BatchServiceBuilder {
        BatchServiceBuilder::default()
    }

    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.handle.stats.snapshot()
    }

    /// Stop accepting commands, drain pending events, wait up to the print
    /// grace period for label threads, and return the final counters.
    pub fn shutdown(mut self) -> StatsSnapshot {
        self.stop_threads();
        self.handle.stats.snapshot()
    }

    fn stop_threads(&mut self) {
        // The actor owns the FSM and with it the only event sender, so joining
        // it first lets the consumer drain and observe disconnection.
        let _ = self.handle.commands.send(Command::Shutdown);
        join_named(self.actor.take(), "fsm");
        join_named(self.consumer.take(), "event");

        let deadline = Instant::now() + self.print_grace;
        while self.handle.stats.prints_in_flight() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let abandoned = self.handle.stats.prints_in_flight();
        if abandoned > 0 {
            tracing::warn!(abandoned, "abandoning in-flight label prints");
        }
    }
}

impl Drop for BatchService {
    fn drop(&mut self) {
        if self.actor.is_some() || self.consumer.is_some() {
            self.stop_threads();
        }
    }
}

fn join_named(handle: Option<JoinHandle<()>>, name: &str) {
    if let Some(h) = handle {
        match h.join() {
            Ok(()) => tracing::trace!(thread = name, "service thread joined"),
            Err(e) => tracing::warn!(thread = name, ?e, "service thread panicked"),
        }
    }
}

// ── FSM actor ───────────────────────────────────────────────────────────────

fn run_actor(
    mut fsm: BatchFsm,
    flow: PrintFlow,
    commands: &xch::Receiver<Command>,
    snapshot: &ArcSwap<FsmSnapshot>,
) {
    for cmd in commands.iter() {
        match cmd {
            Command::Start {
                batch_id,
                product_id,
                placement_min_weight,
            } => fsm.start_batch(&batch_id, &product_id, placement_min_weight),
            Command::Stop => fsm.stop_batch(),
            Command::ChangeProduct(id) => {
                fsm.change_product(&id);
            }
            Command::Sample(sample) => {
                if fsm.active_batch_id().is_none() {
                    continue;
                }
                tracing::trace!(value = sample.value, t = sample.timestamp, "sample");
                fsm.process_sample(&sample);
                if flow == PrintFlow::FastAcknowledge
                    && fsm.state() == BatchState::Locked
                    && fsm.is_print_requested()
                {
                    fsm.acknowledge_print();
                }
            }
            Command::AcknowledgePrint => {
                fsm.acknowledge_print();
            }
            Command::CancelPrintRequest => {
                fsm.cancel_print_request();
            }
            Command::ConfirmPrintSent(epc) => {
                if !fsm.confirm_print_sent(&epc) {
                    tracing::debug!(state = %fsm.state(), "print confirmation ignored");
                }
            }
            Command::ConfirmPrintCompleted => {
                if !fsm.confirm_print_completed() {
                    tracing::debug!(state = %fsm.state(), "print completion ignored");
                }
            }
            Command::Pause(reason) => {
                fsm.pause(reason);
            }
            Command::Resume => {
                fsm.resume();
            }
            Command::Flush(reply) => {
                publish(&fsm, snapshot);
                let _ = reply.send(());
                continue;
            }
            Command::Shutdown => break,
        }
        publish(&fsm, snapshot);
    }
    tracing::debug!("fsm actor exiting");
}

fn publish(fsm: &BatchFsm, snapshot: &ArcSwap<FsmSnapshot>) {
    let next = fsm.snapshot();
    if **snapshot.load() != next {
        snapshot.store(Arc::new(next));
    }
}

// ── Event consumer ──────────────────────────────────────────────────────────

struct Orchestrator {
    commands: xch::Sender<Command>,
    epc_source: Box<dyn EpcSource>,
    store: Arc<dyn RecordStore>,
    printer: Arc<dyn LabelPrinter>,
    stats: Arc<ServiceStats>,
    taps: Vec<xch::Sender<DomainEvent>>,
    flow: PrintFlow,
}

impl Orchestrator {
    fn run(mut self, events: &xch::Receiver<DomainEvent>) {
        for event in events.iter() {
            if let Err(e) = self.handle(&event) {
                ServiceStats::bump(&self.stats.handler_errors);
                tracing::error!(
                    event = event.name(),
                    batch_id = event.batch_id(),
                    error = %e,
                    "event handling failed"
                );
            }
            self.forward(&event);
        }
        tracing::debug!("event consumer exiting");
    }

    fn handle(&mut self, event: &DomainEvent) -> Result<()> {
        match &event.kind {
            EventKind::WeightStabilized {
                batch_id,
                product_id,
                weight,
                unit,
            } => self.on_weight_stabilized(batch_id, product_id, *weight, unit),
            EventKind::BatchStarted { batch_id } => {
                tracing::info!(batch_id, "batch started");
                Ok(())
            }
            EventKind::BatchCompleted { batch_id } => {
                tracing::info!(batch_id, "batch completed");
                Ok(())
            }
            EventKind::ProductChanged {
                batch_id,
                product_id,
            } => {
                tracing::info!(batch_id, product_id, "product changed");
                Ok(())
            }
            EventKind::LabelPrinted {
                batch_id,
                epc_code,
                weight,
                ..
            } => {
                tracing::info!(batch_id, epc = %epc_code, weight, "label print confirmed");
                Ok(())
            }
        }
    }

    fn on_weight_stabilized(
        &mut self,
        batch_id: &str,
        product_id: &str,
        weight: f64,
        unit: &str,
    ) -> Result<()> {
        ServiceStats::bump(&self.stats.stabilized);
        tracing::info!(batch_id, product_id, weight, unit, "weight stabilized");

        let epc_code = match self.epc_source.generate_next() {
            Ok(code) => code,
            Err(e) => {
                self.label_lost();
                return Err(eyre::Report::new(LabelerError::Epc(e.to_string())));
            }
        };

        let record = WeightRecord {
            batch_id: batch_id.to_string(),
            product_id: product_id.to_string(),
            weight,
            unit: unit.to_string(),
            epc_code: epc_code.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.append(&record) {
            self.label_lost();
            return Err(eyre::Report::new(LabelerError::Persist(e.to_string()))
                .wrap_err(format!("label {epc_code} not persisted; print skipped")));
        }
        ServiceStats::bump(&self.stats.persisted);

        self.dispatch_print(LabelJob {
            weight,
            unit: unit.to_string(),
            epc_code,
            product_id: product_id.to_string(),
        });
        Ok(())
    }

    /// A held `Locked` state would otherwise wait forever for a print that
    /// never starts.
    fn label_lost(&self) {
        ServiceStats::bump(&self.stats.lost_labels);
        if self.flow == PrintFlow::Confirmed {
            let _ = self.commands.send(Command::Pause(PauseReason::StorageError));
        }
    }

    /// Fire-and-forget print on its own thread; the outcome only reaches logs
    /// and counters.
    fn dispatch_print(&self, job: LabelJob) {
        let printer = Arc::clone(&self.printer);
        let stats = Arc::clone(&self.stats);
        let feedback = (self.flow == PrintFlow::Confirmed).then(|| self.commands.clone());
        stats.prints_in_flight.fetch_add(1, Ordering::AcqRel);

        let spawned = std::thread::Builder::new()
            .name("labeler-print".into())
            .spawn(move || {
                match printer.print(&job) {
                    Ok(()) => {
                        ServiceStats::bump(&stats.printed);
                        tracing::info!(epc = %job.epc_code, weight = job.weight, "label printed");
                        if let Some(tx) = &feedback {
                            let _ = tx.send(Command::ConfirmPrintSent(job.epc_code.clone()));
                            let _ = tx.send(Command::ConfirmPrintCompleted);
                        }
                    }
                    Err(e) => {
                        ServiceStats::bump(&stats.print_failures);
                        tracing::warn!(epc = %job.epc_code, error = %e, "label print failed");
                        if let Some(tx) = &feedback {
                            let _ = tx.send(Command::Pause(PauseReason::PrinterError));
                        }
                    }
                }
                stats.prints_in_flight.fetch_sub(1, Ordering::AcqRel);
            });

        if let Err(e) = spawned {
            self.stats.prints_in_flight.fetch_sub(1, Ordering::AcqRel);
            ServiceStats::bump(&self.stats.print_failures);
            tracing::warn!(error = %e, "could not spawn print thread");
            if self.flow == PrintFlow::Confirmed {
                let _ = self.commands.send(Command::Pause(PauseReason::PrinterError));
            }
        }
    }

    fn forward(&mut self, event: &DomainEvent) {
        self.taps.retain(|tap| tap.send(event.clone()).is_ok());
    }
}
