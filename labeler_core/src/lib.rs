#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core weigh-and-label logic (hardware-agnostic).
//!
//! Turns a noisy stream of scale readings into discrete "product placed,
//! weighed, ready to label" events. All device interaction goes through the
//! `labeler_traits` seams (`WeightSource`, `LabelPrinter`, `EpcSource`) and the
//! `RecordStore` trait defined here.
//!
//! ## Architecture
//!
//! - **Stability**: sliding-window mean / std-dev / range verdict (`stability`)
//! - **State machine**: batch workflow with pause sub-state (`fsm`, `state`)
//! - **Events**: the FSM's only output (`event`)
//! - **Service**: single-owner FSM thread plus the event consumer that
//!   acknowledges, numbers, persists and prints (`service`)
//! - **Ingest**: sensor thread feeding the service (`ingest`)
//!
//! Time is `f64` seconds on a monotonic axis. The FSM never reads a clock
//! itself; samples carry their own timestamps.

pub mod config;
pub mod conversions;
pub mod epc;
pub mod error;
pub mod event;
pub mod fsm;
pub mod ingest;
pub mod mocks;
pub mod record;
pub mod sample;
pub mod service;
pub mod stability;
pub mod state;
pub mod util;

pub use config::{FsmConfig, StabilityConfig, change_limit};
pub use epc::{EpcCode, EpcError};
pub use error::{BuildError, LabelerError, Report, Result};
pub use event::{DomainEvent, EventKind};
pub use fsm::BatchFsm;
pub use ingest::Ingest;
pub use labeler_config::DEFAULT_EPC_PREFIX;
pub use record::{RecordStore, WeightRecord};
pub use sample::WeightSample;
pub use service::{BatchService, BatchServiceBuilder, PrintFlow, ServiceHandle, ServiceStats, StatsSnapshot};
pub use stability::StabilityDetector;
pub use state::{BatchState, FsmSnapshot, PauseReason};
