//! Batch processing state machine.
//!
//! Consumes weight samples and commands, owns one `StabilityDetector`, and
//! reports everything that happens as `DomainEvent`s on a channel. No I/O and
//! no failures: every branch is a total function over its inputs, and
//! "failure" is represented as a `PauseReason`.
//!
//! Guard order per sample: the empty-debounce marker is updated first, then
//! `Paused` recovery is checked, then the sample enters the detector, then the
//! per-state handler runs.

use crossbeam_channel as xch;

use crate::config::FsmConfig;
use crate::event::{DomainEvent, EventKind};
use crate::sample::WeightSample;
use crate::stability::StabilityDetector;
use crate::state::{BatchState, FsmSnapshot, PauseReason};

/// Slack for float comparisons of elapsed seconds.
const TIME_EPS: f64 = 1e-9;

pub struct BatchFsm {
    events: xch::Sender<DomainEvent>,
    detector: StabilityDetector,
    cfg: FsmConfig,

    state: BatchState,
    pause_reason: PauseReason,
    active_batch_id: Option<String>,
    active_product_id: Option<String>,
    locked_weight: Option<f64>,
    unit: String,

    state_entered_at: f64,
    last_timestamp: f64,
    below_empty_since: Option<f64>,
    print_requested: bool,
    waiting_for_change: bool,
    reference_weight: f64,
}

impl core::fmt::Debug for BatchFsm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BatchFsm")
            .field("state", &self.state)
            .field("pause_reason", &self.pause_reason)
            .field("active_batch_id", &self.active_batch_id)
            .field("locked_weight", &self.locked_weight)
            .field("print_requested", &self.print_requested)
            .finish()
    }
}

impl BatchFsm {
    pub fn new(
        events: xch::Sender<DomainEvent>,
        detector: StabilityDetector,
        cfg: FsmConfig,
    ) -> Self {
        Self {
            events,
            detector,
            cfg,
            state: BatchState::Idle,
            pause_reason: PauseReason::None,
            active_batch_id: None,
            active_product_id: None,
            locked_weight: None,
            unit: String::from("kg"),
            state_entered_at: 0.0,
            last_timestamp: 0.0,
            below_empty_since: None,
            print_requested: false,
            waiting_for_change: false,
            reference_weight: 0.0,
        }
    }

    // ── Read-only state ─────────────────────────────────────────────────────

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn pause_reason(&self) -> PauseReason {
        self.pause_reason
    }

    pub fn active_batch_id(&self) -> Option<&str> {
        self.active_batch_id.as_deref()
    }

    pub fn active_product_id(&self) -> Option<&str> {
        self.active_product_id.as_deref()
    }

    pub fn locked_weight(&self) -> Option<f64> {
        self.locked_weight
    }

    /// Reference weight armed by `acknowledge_print`; 0 once the platform cleared.
    pub fn reference_weight(&self) -> f64 {
        self.reference_weight
    }

    pub fn is_print_requested(&self) -> bool {
        self.print_requested
    }

    pub fn is_waiting_for_change(&self) -> bool {
        self.waiting_for_change
    }

    pub fn detector(&self) -> &StabilityDetector {
        &self.detector
    }

    pub fn config(&self) -> &FsmConfig {
        &self.cfg
    }

    pub fn snapshot(&self) -> FsmSnapshot {
        FsmSnapshot {
            state: self.state,
            pause_reason: self.pause_reason,
            active_batch_id: self.active_batch_id.clone(),
            active_product_id: self.active_product_id.clone(),
            locked_weight: self.locked_weight,
        }
    }

    // ── Commands ────────────────────────────────────────────────────────────

    /// Begin (or restart) a batch. Valid from any state.
    pub fn start_batch(&mut self, batch_id: &str, product_id: &str, placement_min_weight: f64) {
        self.active_batch_id = Some(batch_id.to_string());
        self.active_product_id = Some(product_id.to_string());
        self.detector.reset();
        self.detector.set_placement_min_weight(placement_min_weight);
        self.locked_weight = None;
        self.print_requested = false;
        self.pause_reason = PauseReason::None;

        self.enter_wait_empty(self.last_timestamp);
        self.emit(EventKind::BatchStarted {
            batch_id: batch_id.to_string(),
        });
    }

    /// Stop the active batch. Valid from any state; ends in `Paused(BatchStopped)`.
    pub fn stop_batch(&mut self) {
        if let Some(batch_id) = self.active_batch_id.clone() {
            self.emit(EventKind::BatchCompleted { batch_id });
        }
        self.pause(PauseReason::BatchStopped);
    }

    /// Change the active product. Only honored in `WaitEmpty`; returns whether it applied.
    pub fn change_product(&mut self, product_id: &str) -> bool {
        if self.state != BatchState::WaitEmpty {
            tracing::debug!(
                state = %self.state,
                product_id,
                "product change ignored outside WaitEmpty"
            );
            return false;
        }
        self.active_product_id = Some(product_id.to_string());
        if let Some(batch_id) = self.active_batch_id.clone() {
            self.emit(EventKind::ProductChanged {
                batch_id,
                product_id: product_id.to_string(),
            });
        }
        true
    }

    /// Fast path out of `Locked`: capture the locked weight as reference and
    /// wait in `Settling` for the next real change. Never blocks.
    pub fn acknowledge_print(&mut self) -> bool {
        if self.state != BatchState::Locked {
            return false;
        }
        self.reference_weight = self.locked_weight.unwrap_or(0.0);
        self.waiting_for_change = true;
        self.detector.reset();
        tracing::debug!(
            reference = self.reference_weight,
            "print acknowledged, waiting for change"
        );
        self.transition(BatchState::Settling, self.last_timestamp);
        true
    }

    /// Withdraw a pending print request while `Locked`. The next sample within
    /// tolerance issues a fresh `WeightStabilized`; a real change sends the FSM
    /// back to `Settling` instead of pausing.
    pub fn cancel_print_request(&mut self) -> bool {
        if self.state != BatchState::Locked || !self.print_requested {
            return false;
        }
        self.print_requested = false;
        tracing::debug!("print request withdrawn");
        true
    }

    /// `Locked` → `Printing` once a print was requested; emits `LabelPrinted`.
    pub fn confirm_print_sent(&mut self, epc_code: &str) -> bool {
        if self.state != BatchState::Locked || !self.print_requested {
            return false;
        }
        self.transition(BatchState::Printing, self.last_timestamp);
        if let (Some(batch_id), Some(product_id), Some(weight)) = (
            self.active_batch_id.clone(),
            self.active_product_id.clone(),
            self.locked_weight,
        ) {
            self.emit(EventKind::LabelPrinted {
                batch_id,
                product_id,
                epc_code: epc_code.to_string(),
                weight,
            });
        }
        true
    }

    /// `Printing` → `PostGuard`.
    pub fn confirm_print_completed(&mut self) -> bool {
        if self.state != BatchState::Printing {
            return false;
        }
        self.transition(BatchState::PostGuard, self.last_timestamp);
        true
    }

    /// Enter `Paused` with the given reason. `PauseReason::None` is ignored.
    pub fn pause(&mut self, reason: PauseReason) -> bool {
        if reason == PauseReason::None {
            return false;
        }
        self.pause_reason = reason;
        self.transition(BatchState::Paused, self.last_timestamp);
        true
    }

    /// Operator recovery from any pause reason back to `WaitEmpty`.
    pub fn resume(&mut self) -> bool {
        if self.state != BatchState::Paused {
            return false;
        }
        self.pause_reason = PauseReason::None;
        self.detector.reset();
        self.enter_wait_empty(self.last_timestamp);
        true
    }

    // ── Samples ─────────────────────────────────────────────────────────────

    pub fn process_sample(&mut self, sample: &WeightSample) {
        let t = sample.timestamp;
        self.last_timestamp = t;
        if self.unit != sample.unit {
            self.unit.clone_from(&sample.unit);
        }
        self.update_empty_status(sample.value, t);

        match self.state {
            BatchState::Idle => return,
            BatchState::Paused => {
                self.handle_paused(t);
                return;
            }
            _ => {}
        }

        self.detector.add_sample(sample);

        match self.state {
            BatchState::WaitEmpty => self.handle_wait_empty(sample),
            BatchState::Loading => self.handle_loading(t),
            BatchState::Settling => self.handle_settling(sample),
            BatchState::Locked => self.handle_locked(sample.value),
            BatchState::Printing => self.handle_printing(sample.value),
            BatchState::PostGuard => self.handle_post_guard(t),
            BatchState::Idle | BatchState::Paused => {}
        }
    }

    fn handle_wait_empty(&mut self, sample: &WeightSample) {
        if sample.value >= self.detector.placement_min_weight() {
            self.detector.reset();
            self.print_requested = false;
            self.transition(BatchState::Loading, sample.timestamp);
        }
    }

    fn handle_loading(&mut self, t: f64) {
        if self.cleared(t) {
            self.detector.reset();
            self.enter_wait_empty(t);
            return;
        }
        let dwell = t - self.state_entered_at;
        if dwell + TIME_EPS >= self.cfg.settle_seconds
            && self.detector.total_samples() >= self.cfg.min_samples
        {
            self.transition(BatchState::Settling, t);
        }
    }

    fn handle_settling(&mut self, sample: &WeightSample) {
        let t = sample.timestamp;
        if self.cleared(t) {
            self.detector.reset();
            self.enter_wait_empty(t);
            return;
        }

        if self.waiting_for_change {
            let diff = (sample.value - self.reference_weight).abs();
            let limit = self.cfg.change_limit(self.reference_weight);
            if diff > limit {
                self.waiting_for_change = false;
                self.detector.reset();
                self.detector.add_sample(sample);
                tracing::debug!(
                    value = sample.value,
                    reference = self.reference_weight,
                    diff,
                    limit,
                    "weight change detected"
                );
            }
            return;
        }

        if self.detector.is_stable() {
            let mean = self.detector.mean();
            // A settled empty platform is left to the clear debounce.
            if mean < self.cfg.empty_threshold {
                return;
            }
            self.lock_and_request_print(mean, t);
        }
    }

    fn handle_locked(&mut self, value: f64) {
        let locked = self.locked_weight.unwrap_or(0.0);
        if (value - locked).abs() > self.cfg.change_limit(locked) {
            if self.print_requested {
                self.pause(PauseReason::ReweighRequired);
            } else {
                self.detector.reset();
                self.print_requested = false;
                self.transition(BatchState::Settling, self.last_timestamp);
            }
            return;
        }

        if !self.print_requested {
            self.print_requested = true;
            self.emit_weight_stabilized();
        }
    }

    fn handle_printing(&mut self, value: f64) {
        let locked = self.locked_weight.unwrap_or(0.0);
        if (value - locked).abs() > self.cfg.change_limit(locked) {
            self.pause(PauseReason::ReweighRequired);
        }
    }

    fn handle_post_guard(&mut self, t: f64) {
        if self.cleared(t) {
            self.enter_wait_empty(t);
        }
    }

    fn handle_paused(&mut self, t: f64) {
        if self.pause_reason.auto_clears() && self.cleared(t) {
            self.pause_reason = PauseReason::None;
            self.detector.reset();
            self.enter_wait_empty(t);
        }
    }

    fn lock_and_request_print(&mut self, mean: f64, t: f64) {
        if self.active_batch_id.is_none() || self.active_product_id.is_none() {
            return;
        }
        self.locked_weight = Some(mean);
        self.print_requested = true;
        tracing::info!(weight = mean, unit = %self.unit, "weight locked");
        self.transition(BatchState::Locked, t);
        self.emit_weight_stabilized();
    }

    fn emit_weight_stabilized(&self) {
        if let (Some(batch_id), Some(product_id), Some(weight)) = (
            self.active_batch_id.clone(),
            self.active_product_id.clone(),
            self.locked_weight,
        ) {
            self.emit(EventKind::WeightStabilized {
                batch_id,
                product_id,
                weight,
                unit: self.unit.clone(),
            });
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    fn enter_wait_empty(&mut self, t: f64) {
        self.waiting_for_change = false;
        self.reference_weight = 0.0;
        self.transition(BatchState::WaitEmpty, t);
    }

    fn transition(&mut self, to: BatchState, t: f64) {
        if self.state != to {
            tracing::debug!(from = %self.state, to = %to, t, "fsm transition");
        }
        self.state = to;
        self.state_entered_at = t;
    }

    fn update_empty_status(&mut self, value: f64, t: f64) {
        if value < self.cfg.empty_threshold {
            self.below_empty_since.get_or_insert(t);
        } else {
            self.below_empty_since = None;
        }
    }

    /// Below-empty held continuously for at least `clear_seconds`, less
    /// `TIME_EPS` of slack so sample timestamps that land a rounding error
    /// short of the limit still count. A dip ending earlier than that does not.
    fn cleared(&self, t: f64) -> bool {
        self.below_empty_since
            .is_some_and(|since| t - since + TIME_EPS >= self.cfg.clear_seconds)
    }

    fn emit(&self, kind: EventKind) {
        let event = DomainEvent::new(kind);
        tracing::trace!(event = event.name(), "emit");
        if self.events.send(event).is_err() {
            tracing::trace!("event receiver dropped; event discarded");
        }
    }
}
