//! Ingest thread lifecycle: end of stream, disconnect, drop, and paced timing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use labeler_core::mocks::{CountingEpcSource, MemoryRecordStore, RecordingPrinter, ScriptedSource};
use labeler_core::{BatchService, Ingest};
use labeler_traits::clock::MonotonicClock;
use labeler_traits::clock::manual::ManualClock;
use labeler_traits::{BoxError, Reading, WeightSource};

struct EndlessSource;

impl WeightSource for EndlessSource {
    fn read(&mut self, _timeout: Duration) -> Result<Option<Reading>, BoxError> {
        std::thread::sleep(Duration::from_millis(1));
        Ok(Some(Reading::new(0.0, "kg", true)))
    }
}

fn service() -> BatchService {
    BatchService::builder()
        .with_epc_source(CountingEpcSource::default())
        .with_record_store(Arc::new(MemoryRecordStore::new()))
        .with_printer(Arc::new(RecordingPrinter::new()))
        .build()
        .unwrap()
}

fn wait_finished(ingest: &Ingest) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if ingest.is_finished() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn ingest_exits_at_end_of_stream() {
    let svc = service();
    let source = ScriptedSource::new(vec![0.5; 20]);
    let ingest = Ingest::spawn_event(
        source,
        svc.handle(),
        Duration::from_millis(10),
        MonotonicClock::new(),
    );
    assert!(wait_finished(&ingest));
    assert_eq!(ingest.forwarded(), 20);
    ingest.join();
}

#[test]
fn ingest_skips_non_finite_and_read_errors() {
    let svc = service();
    let mut source = ScriptedSource::new([1.0, f64::NAN, 2.0]);
    source.push_error("checksum mismatch");
    source.push(f64::INFINITY);
    source.push(3.0);
    let ingest = Ingest::spawn_event(
        source,
        svc.handle(),
        Duration::from_millis(10),
        MonotonicClock::new(),
    );
    assert!(wait_finished(&ingest));
    assert_eq!(ingest.forwarded(), 3);
}

#[test]
fn ingest_exits_when_service_is_gone() {
    let svc = service();
    let ingest = Ingest::spawn_event(
        EndlessSource,
        svc.handle(),
        Duration::from_millis(10),
        MonotonicClock::new(),
    );
    std::thread::sleep(Duration::from_millis(20));
    svc.shutdown();
    assert!(wait_finished(&ingest));
}

#[test]
fn dropping_ingest_stops_the_thread() {
    let svc = service();
    for _ in 0..10 {
        let ingest = Ingest::spawn(
            EndlessSource,
            svc.handle(),
            100,
            Duration::from_millis(10),
            MonotonicClock::new(),
        );
        std::thread::sleep(Duration::from_millis(5));
        drop(ingest);
    }
}

#[test]
fn request_stop_ends_loop() {
    let svc = service();
    let ingest = Ingest::spawn_event(
        EndlessSource,
        svc.handle(),
        Duration::from_millis(10),
        MonotonicClock::new(),
    );
    ingest.request_stop();
    assert!(wait_finished(&ingest));
    assert!(ingest.stalled_for_now() < 60_000);
}

#[test]
fn paced_ingest_on_shared_manual_clock_locks_a_load() {
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
    h.flush().unwrap();

    // Each paced sleep advances the shared clock by one 10 Hz period.
    let ingest = Ingest::spawn(
        ScriptedSource::new(vec![4.0; 15]),
        h.clone(),
        10,
        Duration::from_millis(10),
        clock.clone(),
    );
    assert!(wait_finished(&ingest));
    assert_eq!(ingest.stalled_for(1500), 100);
    ingest.join();

    h.flush().unwrap();
    let stats = svc.shutdown();
    assert_eq!(stats.persisted, 1);
    assert_eq!(store.len(), 1);
}
