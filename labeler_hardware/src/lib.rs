#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Device adapters behind the `labeler_traits` seams.
//!
//! No real serial transport lives here; the scales are a scripted simulator
//! and a CSV trace replayer, and the printers write a plain-text label to a
//! device file or to the log.

pub mod error;
pub mod printer;
pub mod replay;
pub mod sim;

pub use error::HwError;
pub use printer::{DeviceFilePrinter, LogPrinter, render_label};
pub use replay::ReplayScale;
pub use sim::SimulatedScale;
