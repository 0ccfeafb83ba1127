//! End-to-end behavior of the batch service: acknowledge-before-I/O ordering,
//! failure isolation, event taps and shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use labeler_core::mocks::{CountingEpcSource, MemoryRecordStore, RecordingPrinter};
use labeler_core::{
    BatchService, BatchState, BuildError, DomainEvent, EventKind, FsmConfig, LabelerError,
    PauseReason, PrintFlow, RecordStore, ServiceHandle, WeightSample,
};
use labeler_traits::clock::manual::ManualClock;

const PREFIX: &str = "3034257BF7194E4";

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

struct Feeder {
    handle: ServiceHandle,
    n: u32,
}

impl Feeder {
    fn new(handle: ServiceHandle) -> Self {
        Self { handle, n: 0 }
    }

    /// Queue samples without waiting for the actor to apply them.
    fn push(&mut self, value: f64, count: usize) {
        for _ in 0..count {
            let t = f64::from(self.n) * 0.1;
            self.handle
                .process_sample(WeightSample::kg(value, t))
                .unwrap();
            self.n += 1;
        }
    }

    fn feed(&mut self, value: f64, count: usize) {
        self.push(value, count);
        self.handle.flush().unwrap();
    }
}

struct Rig {
    svc: BatchService,
    store: Arc<MemoryRecordStore>,
    printer: Arc<RecordingPrinter>,
    events: xch::Receiver<DomainEvent>,
}

fn rig_with(printer: RecordingPrinter, flow: PrintFlow) -> Rig {
    let store = Arc::new(MemoryRecordStore::new());
    let printer = Arc::new(printer);
    let (tap, events) = xch::unbounded();
    let svc = BatchService::builder()
        .with_epc_source(CountingEpcSource::new(PREFIX))
        .with_record_store(store.clone())
        .with_printer(printer.clone())
        .with_print_flow(flow)
        .event_tap(tap)
        .build()
        .unwrap();
    Rig {
        svc,
        store,
        printer,
        events,
    }
}

fn rig() -> Rig {
    rig_with(RecordingPrinter::new(), PrintFlow::FastAcknowledge)
}

const WAIT: Duration = Duration::from_secs(3);

#[test]
fn stabilization_persists_then_prints() {
    let rig = rig();
    let h = rig.svc.handle();
    h.start_batch("B1", "P1", 1.0).unwrap();
    let mut feeder = Feeder::new(h.clone());
    feeder.feed(2.0, 15);

    assert!(wait_until(WAIT, || h.stats().printed() == 1));
    assert!(wait_until(WAIT, || h.state() == BatchState::Settling));

    let records = rig.store.take_all_pending().unwrap();
    assert_eq!(records.len(), 1);
    let rec = &records[0];
    assert_eq!(rec.batch_id, "B1");
    assert_eq!(rec.product_id, "P1");
    assert_eq!(rec.unit, "kg");
    assert!((rec.weight - 2.0).abs() < 1e-9);
    assert_eq!(rec.epc_code, format!("{PREFIX}00000001"));

    let jobs = rig.printer.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].epc_code, rec.epc_code);
    assert_eq!(jobs[0].product_id, "P1");

    let stats = rig.svc.shutdown();
    assert_eq!(stats.stabilized, 1);
    assert_eq!(stats.persisted, 1);
    assert_eq!(stats.lost_labels, 0);
}

#[test]
fn unloading_stack_through_service_gives_three_labels() {
    let rig = rig();
    let h = rig.svc.handle();
    h.start_batch("B1", "P1", 1.0).unwrap();
    let mut feeder = Feeder::new(h.clone());

    for (k, load) in [9.0, 8.0, 2.0].into_iter().enumerate() {
        feeder.feed(load, 15);
        let expected = k as u64 + 1;
        assert!(
            wait_until(WAIT, || h.stats().stabilized() == expected
                && h.state() == BatchState::Settling),
            "load {load}: {:?}",
            h.snapshot()
        );
    }
    feeder.feed(0.0, 15);
    assert_eq!(h.state(), BatchState::WaitEmpty);

    let stats = rig.svc.shutdown();
    assert_eq!(stats.stabilized, 3);
    assert_eq!(stats.persisted, 3);
    assert_eq!(stats.printed, 3);

    let mut epcs: Vec<String> = rig.printer.jobs().into_iter().map(|j| j.epc_code).collect();
    epcs.sort();
    epcs.dedup();
    assert_eq!(epcs.len(), 3);
    assert_eq!(rig.store.len(), 3);
}

#[test]
fn queued_load_change_after_lock_is_labeled_not_paused() {
    for _ in 0..10 {
        let rig = rig();
        let h = rig.svc.handle();
        h.start_batch("B1", "P1", 1.0).unwrap();
        let mut feeder = Feeder::new(h.clone());
        feeder.push(9.0, 15);
        feeder.push(8.0, 15);
        h.flush().unwrap();

        assert_eq!(h.state(), BatchState::Settling, "{:?}", h.snapshot());
        assert_eq!(h.pause_reason(), PauseReason::None);
        assert!(wait_until(WAIT, || h.stats().persisted() == 2));

        let stats = rig.svc.shutdown();
        assert_eq!(stats.stabilized, 2);
        assert_eq!(stats.lost_labels, 0);
        let weights: Vec<f64> = rig
            .store
            .take_all_pending()
            .unwrap()
            .into_iter()
            .map(|r| r.weight)
            .collect();
        assert_eq!(weights.len(), 2);
        assert!((weights[0] - 9.0).abs() < 1e-9);
        assert!((weights[1] - 8.0).abs() < 1e-9);
    }
}

#[test]
fn slow_printer_does_not_hold_the_state_machine() {
    let rig = rig_with(
        RecordingPrinter::slow(Duration::from_millis(400)),
        PrintFlow::FastAcknowledge,
    );
    let h = rig.svc.handle();
    h.start_batch("B1", "P1", 1.0).unwrap();
    let mut feeder = Feeder::new(h.clone());

    feeder.feed(9.0, 15);
    assert!(wait_until(Duration::from_millis(300), || h.state()
        == BatchState::Settling));
    assert_eq!(h.stats().printed(), 0, "print still in flight");

    feeder.feed(8.0, 15);
    assert!(wait_until(Duration::from_millis(300), || h
        .stats()
        .persisted()
        == 2));
    assert_eq!(h.stats().printed(), 0, "first print still in flight");

    let stats = rig.svc.shutdown();
    assert_eq!(stats.printed, 2);
}

#[test]
fn printer_failure_is_logged_and_ignored() {
    let rig = rig_with(RecordingPrinter::failing(), PrintFlow::FastAcknowledge);
    let h = rig.svc.handle();
    h.start_batch("B1", "P1", 1.0).unwrap();
    let mut feeder = Feeder::new(h.clone());
    feeder.feed(2.0, 15);

    assert!(wait_until(WAIT, || h.stats().print_failures() == 1));
    assert_eq!(h.stats().persisted(), 1);
    assert_eq!(h.state(), BatchState::Settling);
    assert_eq!(h.pause_reason(), PauseReason::None);
}

#[test]
fn persistence_failure_skips_print_and_keeps_running() {
    let rig = rig();
    let h = rig.svc.handle();
    rig.store.set_fail_appends(true);
    h.start_batch("B1", "P1", 1.0).unwrap();
    let mut feeder = Feeder::new(h.clone());

    feeder.feed(9.0, 15);
    assert!(wait_until(WAIT, || h.stats().handler_errors() == 1));
    assert_eq!(h.stats().lost_labels(), 1);
    assert_eq!(h.stats().persisted(), 0);
    assert!(wait_until(WAIT, || h.state() == BatchState::Settling));

    rig.store.set_fail_appends(false);
    feeder.feed(8.0, 15);
    assert!(wait_until(WAIT, || h.stats().printed() == 1));
    assert_eq!(rig.store.len(), 1);
    assert_eq!(rig.printer.jobs().len(), 1);
}

#[test]
fn epc_failure_counts_a_lost_label() {
    let store = Arc::new(MemoryRecordStore::new());
    let printer = Arc::new(RecordingPrinter::new());
    let svc = BatchService::builder()
        .with_epc_source(CountingEpcSource::failing())
        .with_record_store(store.clone())
        .with_printer(printer.clone())
        .build()
        .unwrap();
    let h = svc.handle();
    h.start_batch("B1", "P1", 1.0).unwrap();
    Feeder::new(h.clone()).feed(2.0, 15);

    assert!(wait_until(WAIT, || h.stats().lost_labels() == 1));
    let stats = svc.shutdown();
    assert_eq!(stats.persisted, 0);
    assert!(store.is_empty());
    assert!(printer.jobs().is_empty());
}

#[test]
fn samples_without_batch_are_ignored() {
    let rig = rig();
    let h = rig.svc.handle();
    for _ in 0..30 {
        h.process_weight(5.0, "kg").unwrap();
    }
    h.flush().unwrap();
    assert_eq!(h.state(), BatchState::Idle);
    assert_eq!(h.stats().stabilized(), 0);
}

#[test]
fn non_finite_weights_are_dropped() {
    let rig = rig();
    let h = rig.svc.handle();
    h.start_batch("B1", "P1", 1.0).unwrap();
    h.process_weight(f64::NAN, "kg").unwrap();
    h.process_weight(f64::INFINITY, "kg").unwrap();
    h.flush().unwrap();
    assert_eq!(h.state(), BatchState::WaitEmpty);
}

#[test]
fn process_weight_stamps_with_service_clock() {
    let clock = ManualClock::new();
    let store = Arc::new(MemoryRecordStore::new());
    let svc = BatchService::builder()
        .with_epc_source(CountingEpcSource::default())
        .with_record_store(store.clone())
        .with_printer(Arc::new(RecordingPrinter::new()))
        .with_clock(clock.clone())
        .build()
        .unwrap();
    let h = svc.handle();
    h.start_batch("B1", "P1", 1.0).unwrap();
    for _ in 0..15 {
        h.process_weight(3.0, "kg").unwrap();
        clock.advance(Duration::from_millis(100));
    }
    h.flush().unwrap();
    assert!(wait_until(WAIT, || h.stats().persisted() == 1));
    assert!((h.now_secs() - 1.5).abs() < 1e-6);
}

#[test]
fn taps_see_events_in_emission_order() {
    let rig = rig();
    let h = rig.svc.handle();
    h.start_batch("B7", "P1", 1.0).unwrap();
    Feeder::new(h.clone()).feed(2.0, 15);
    assert!(wait_until(WAIT, || h.stats().persisted() == 1));
    h.stop_batch().unwrap();
    h.flush().unwrap();

    let names: Vec<&'static str> = (0..3)
        .map(|_| rig.events.recv_timeout(WAIT).unwrap().name())
        .collect();
    assert_eq!(names, ["BatchStarted", "WeightStabilized", "BatchCompleted"]);
}

#[test]
fn change_product_flows_into_records() {
    let rig = rig();
    let h = rig.svc.handle();
    h.start_batch("B1", "P1", 1.0).unwrap();
    h.change_product("P2").unwrap();
    Feeder::new(h.clone()).feed(2.0, 15);
    assert!(wait_until(WAIT, || rig.store.len() == 1));
    assert_eq!(rig.store.take_all_pending().unwrap()[0].product_id, "P2");
    assert!(
        rig.events
            .try_iter()
            .any(|e| matches!(e.kind, EventKind::ProductChanged { .. }))
    );
}

#[test]
fn confirmed_flow_walks_printing_and_post_guard() {
    let rig = rig_with(RecordingPrinter::new(), PrintFlow::Confirmed);
    let h = rig.svc.handle();
    h.start_batch("B1", "P1", 1.0).unwrap();
    let mut feeder = Feeder::new(h.clone());
    feeder.feed(2.0, 15);

    assert!(wait_until(WAIT, || h.state() == BatchState::PostGuard));
    assert!(wait_until(WAIT, || rig
        .events
        .try_iter()
        .any(|e| matches!(e.kind, EventKind::LabelPrinted { .. }))));

    feeder.feed(0.0, 10);
    assert_eq!(h.state(), BatchState::WaitEmpty);
}

#[test]
fn confirmed_flow_pauses_on_printer_error() {
    let rig = rig_with(RecordingPrinter::failing(), PrintFlow::Confirmed);
    let h = rig.svc.handle();
    h.start_batch("B1", "P1", 1.0).unwrap();
    let mut feeder = Feeder::new(h.clone());
    feeder.feed(2.0, 15);

    assert!(wait_until(WAIT, || h.state() == BatchState::Paused));
    assert_eq!(h.pause_reason(), PauseReason::PrinterError);

    // No auto-recovery for printer errors.
    feeder.feed(0.0, 20);
    assert_eq!(h.state(), BatchState::Paused);
    h.resume().unwrap();
    h.flush().unwrap();
    assert_eq!(h.state(), BatchState::WaitEmpty);
}

#[test]
fn confirmed_flow_pauses_on_persist_failure() {
    let rig = rig_with(RecordingPrinter::new(), PrintFlow::Confirmed);
    let h = rig.svc.handle();
    rig.store.set_fail_appends(true);
    h.start_batch("B1", "P1", 1.0).unwrap();
    let mut feeder = Feeder::new(h.clone());
    feeder.feed(2.0, 15);

    assert!(wait_until(WAIT, || h.state() == BatchState::Paused));
    assert_eq!(h.pause_reason(), PauseReason::StorageError);
    assert_eq!(h.stats().lost_labels(), 1);
    assert!(rig.printer.jobs().is_empty());

    feeder.feed(0.0, 20);
    assert_eq!(h.state(), BatchState::Paused);
    rig.store.set_fail_appends(false);
    h.resume().unwrap();
    h.flush().unwrap();
    assert_eq!(h.state(), BatchState::WaitEmpty);
}

#[test]
fn confirmed_flow_pauses_on_epc_failure() {
    let svc = BatchService::builder()
        .with_epc_source(CountingEpcSource::failing())
        .with_record_store(Arc::new(MemoryRecordStore::new()))
        .with_printer(Arc::new(RecordingPrinter::new()))
        .with_print_flow(PrintFlow::Confirmed)
        .build()
        .unwrap();
    let h = svc.handle();
    h.start_batch("B1", "P1", 1.0).unwrap();
    Feeder::new(h.clone()).feed(2.0, 15);

    assert!(wait_until(WAIT, || h.state() == BatchState::Paused));
    assert_eq!(h.pause_reason(), PauseReason::StorageError);
}

#[test]
fn manual_pause_and_resume() {
    let rig = rig();
    let h = rig.svc.handle();
    h.start_batch("B1", "P1", 1.0).unwrap();
    h.pause(PauseReason::Manual).unwrap();
    h.flush().unwrap();
    assert_eq!(h.state(), BatchState::Paused);
    assert_eq!(h.pause_reason(), PauseReason::Manual);
    h.resume().unwrap();
    h.flush().unwrap();
    assert_eq!(h.state(), BatchState::WaitEmpty);
}

#[test]
fn stop_batch_auto_clears_on_empty_platform() {
    let rig = rig();
    let h = rig.svc.handle();
    h.start_batch("B1", "P1", 1.0).unwrap();
    let mut feeder = Feeder::new(h.clone());
    h.stop_batch().unwrap();
    h.flush().unwrap();
    assert_eq!(h.pause_reason(), PauseReason::BatchStopped);
    feeder.feed(0.0, 10);
    assert_eq!(h.state(), BatchState::WaitEmpty);
    assert_eq!(h.snapshot().active_batch_id.as_deref(), Some("B1"));
}

#[test]
fn invalid_placement_weight_is_rejected() {
    let rig = rig();
    let err = rig.svc.handle().start_batch("B1", "P1", f64::NAN).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LabelerError>(),
        Some(LabelerError::Config(_))
    ));
}

#[test]
fn builder_reports_missing_parts() {
    let err = BatchService::builder()
        .with_record_store(Arc::new(MemoryRecordStore::new()))
        .with_printer(Arc::new(RecordingPrinter::new()))
        .build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingEpcSource)
    ));

    let err = BatchService::builder()
        .with_epc_source(CountingEpcSource::default())
        .with_printer(Arc::new(RecordingPrinter::new()))
        .build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingRecordStore)
    ));
}

#[test]
fn builder_rejects_invalid_tuning() {
    let err = BatchService::builder()
        .with_epc_source(CountingEpcSource::default())
        .with_record_store(Arc::new(MemoryRecordStore::new()))
        .with_printer(Arc::new(RecordingPrinter::new()))
        .with_fsm_config(FsmConfig {
            clear_seconds: 0.0,
            ..FsmConfig::default()
        })
        .build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ));
}

#[test]
fn handle_reports_disconnect_after_shutdown() {
    let rig = rig();
    let h = rig.svc.handle();
    rig.svc.shutdown();
    let err = h.start_batch("B1", "P1", 1.0).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LabelerError>(),
        Some(LabelerError::Disconnected)
    ));
    assert!(h.flush().is_err());
}

#[test]
fn dropping_the_service_joins_threads() {
    for _ in 0..10 {
        let rig = rig();
        rig.svc.handle().start_batch("B1", "P1", 1.0).unwrap();
        drop(rig);
    }
}
