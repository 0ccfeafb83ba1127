//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "labeler", version, about = "Weigh-and-label batch CLI")]
pub struct Cli {
    /// Path to config TOML (missing file: built-in defaults)
    #[arg(long, value_name = "FILE", default_value = "etc/labeler.toml")]
    pub config: PathBuf,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging] level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one batch: weigh, number, persist and print until the source ends or Ctrl-C
    Run {
        /// Product being labeled (falls back to [batch] product_id)
        #[arg(long, value_name = "ID")]
        product: Option<String>,
        /// Batch identifier (default: derived from the local time)
        #[arg(long, value_name = "ID")]
        batch_id: Option<String>,
        /// Replay a recorded `t,value,unit,stable` CSV instead of the simulator
        #[arg(long, value_name = "FILE")]
        trace: Option<PathBuf>,
        /// Override [batch] placement_min_weight
        #[arg(long, value_name = "WEIGHT")]
        placement_min_weight: Option<f64>,
        /// Stream every domain event to stdout as a JSON line
        #[arg(long, action = ArgAction::SetTrue)]
        events: bool,
    },
    /// Take all pending records and write them to stdout as JSON lines
    Drain,
    /// Check config, storage and printer setup without running a batch
    SelfCheck,
}
