//! Background sensor ingestion.
//!
//! Spawns a thread that owns the `WeightSource`, forwards every finite reading
//! to the service via `ServiceHandle::process_weight`, and tracks the last-ok
//! timestamp for stall detection. Paced and event-driven variants are provided.
//!
//! The thread exits on end of stream (`Ok(None)`), on the shutdown flag, or when
//! the service is gone. Dropping the `Ingest` joins it.
use labeler_traits::WeightSource;
use labeler_traits::clock::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::service::ServiceHandle;

pub struct Ingest {
    last_ok: Arc<AtomicU64>,
    forwarded: Arc<AtomicU64>,
    epoch: Instant,
    shutdown: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

struct Shared {
    last_ok: Arc<AtomicU64>,
    forwarded: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl Ingest {
    /// Paced ingestion: read, forward, then sleep one period on `clock`.
    pub fn spawn<S, C>(source: S, handle: ServiceHandle, hz: u32, timeout: Duration, clock: C) -> Self
    where
        S: WeightSource + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let period = Duration::from_micros(crate::util::period_us(hz));
        Self::spawn_inner(source, handle, timeout, clock, Some(period))
    }

    /// Event-driven ingestion: rely on `read(timeout)` blocking until the
    /// device has data; no extra sleeps.
    pub fn spawn_event<S, C>(source: S, handle: ServiceHandle, timeout: Duration, clock: C) -> Self
    where
        S: WeightSource + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        Self::spawn_inner(source, handle, timeout, clock, None)
    }

    fn spawn_inner<S, C>(
        source: S,
        handle: ServiceHandle,
        timeout: Duration,
        clock: C,
        period: Option<Duration>,
    ) -> Self
    where
        S: WeightSource + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let last_ok = Arc::new(AtomicU64::new(0));
        let forwarded = Arc::new(AtomicU64::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let shared = Shared {
            last_ok: Arc::clone(&last_ok),
            forwarded: Arc::clone(&forwarded),
            shutdown: Arc::clone(&shutdown),
            finished: Arc::clone(&finished),
        };
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            run(source, &handle, timeout, &clock, epoch, period, &shared);
            shared.finished.store(true, Ordering::Release);
            tracing::trace!("ingest thread exiting cleanly");
        });

        Self {
            last_ok,
            forwarded,
            epoch,
            shutdown,
            finished,
            join_handle: Some(join_handle),
        }
    }

    /// Milliseconds since the last successfully forwarded reading.
    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }

    /// `stalled_for` measured against a real monotonic clock.
    pub fn stalled_for_now(&self) -> u64 {
        let ms = Instant::now().saturating_duration_since(self.epoch).as_millis();
        self.stalled_for(ms.min(u128::from(u64::MAX)) as u64)
    }

    /// Readings forwarded to the service so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// True once the thread has left its loop (end of stream, shutdown, or disconnect).
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Ask the thread to stop after its current read.
    pub fn request_stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Wait for the thread to leave its loop on its own (e.g. end of stream).
    pub fn join(mut self) {
        join(self.join_handle.take());
    }
}

fn run<S: WeightSource, C: Clock>(
    mut source: S,
    handle: &ServiceHandle,
    timeout: Duration,
    clock: &C,
    epoch: Instant,
    period: Option<Duration>,
    shared: &Shared,
) {
    loop {
        if shared.shutdown.load(Ordering::Relaxed) {
            tracing::debug!("ingest thread received shutdown signal");
            break;
        }

        match source.read(timeout) {
            Ok(Some(reading)) => {
                if !reading.value.is_finite() {
                    tracing::debug!("skipping non-finite reading");
                } else {
                    if handle.process_weight(reading.value, &reading.unit).is_err() {
                        tracing::debug!("service disconnected, exiting ingest thread");
                        break;
                    }
                    shared.forwarded.fetch_add(1, Ordering::Relaxed);
                    shared
                        .last_ok
                        .store(clock.ms_since(epoch), Ordering::Relaxed);
                }
            }
            Ok(None) => {
                tracing::info!("weight source reached end of stream");
                break;
            }
            Err(e) => {
                // Transient; the stall watchdog reports persistent failures.
                tracing::trace!(error = %e, "weight read failed");
            }
        }

        if let Some(p) = period {
            if shared.shutdown.load(Ordering::Relaxed) {
                break;
            }
            clock.sleep(p);
        }
    }
}

fn join(handle: Option<std::thread::JoinHandle<()>>) {
    if let Some(handle) = handle {
        match handle.join() {
            Ok(()) => tracing::trace!("ingest thread joined successfully"),
            Err(e) => tracing::warn!(?e, "ingest thread panicked during shutdown"),
        }
    }
}

impl Drop for Ingest {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        join(self.join_handle.take());
    }
}
