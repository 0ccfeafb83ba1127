#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! File-backed collaborators for the batch service.
//!
//! - `JsonlRecordStore`: append-only JSON-lines record file with an atomic
//!   take-and-rotate for downstream synchronization.
//! - `FileEpcGenerator`: monotonic EPC counter persisted after every increment.

pub mod atomic;
pub mod epc_file;
pub mod error;
pub mod jsonl;

pub use epc_file::{COUNTER_FILE, FileEpcGenerator};
pub use error::StoreError;
pub use jsonl::{JsonlRecordStore, RECORDS_FILE, SYNCED_DIR};
