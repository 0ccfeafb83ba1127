#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and recorded-trace parsing for the weigh-and-label station.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//!   Every section is optional; an empty file yields the built-in defaults.
//! - The trace CSV loader enforces headers and timestamp order so a recorded
//!   scale session can be replayed deterministically.
use serde::Deserialize;

/// Default EPC prefix (15 hex digits).
pub const DEFAULT_EPC_PREFIX: &str = "3034257BF7194E4";

/// Recorded scale trace row.
///
/// Expected headers:
/// t,value,unit,stable
///
/// Example:
/// t,value,unit,stable
/// 0.00,0.000,kg,true
/// 0.05,1.512,kg,false
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TraceRow {
    /// Seconds since the start of the recording.
    pub t: f64,
    pub value: f64,
    pub unit: String,
    /// Device-reported stability flag; informational only.
    pub stable: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FsmSection {
    pub settle_seconds: f64,
    pub clear_seconds: f64,
    pub min_samples: usize,
    pub empty_threshold: f64,
    pub eps: f64,
    pub eps_align: f64,
}

impl Default for FsmSection {
    fn default() -> Self {
        Self {
            settle_seconds: 0.50,
            clear_seconds: 0.70,
            min_samples: 10,
            empty_threshold: 0.05,
            eps: 0.03,
            eps_align: 0.06,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StabilitySection {
    pub sigma: f64,
    pub eps: f64,
    pub eps_align: f64,
    pub window_seconds: f64,
    pub min_samples: usize,
}

impl Default for StabilitySection {
    fn default() -> Self {
        Self {
            sigma: 0.01,
            eps: 0.03,
            eps_align: 0.06,
            window_seconds: 1.0,
            min_samples: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Read, forward, sleep one sample period.
    #[default]
    Paced,
    /// Let the device's own blocking read set the pace.
    Event,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ScaleSection {
    pub unit: String,
    pub sample_rate_hz: u32,
    /// Max time a single read may block (ms).
    pub read_timeout_ms: u64,
    /// Warn when no reading was forwarded for this long (ms). 0 disables.
    pub stall_warn_ms: u64,
    pub mode: IngestMode,
}

impl Default for ScaleSection {
    fn default() -> Self {
        Self {
            unit: "kg".into(),
            sample_rate_hz: 20,
            read_timeout_ms: 150,
            stall_warn_ms: 2000,
            mode: IngestMode::Paced,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BatchSection {
    /// Weight that counts as "something was placed".
    pub placement_min_weight: f64,
    pub product_id: Option<String>,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            placement_min_weight: 1.0,
            product_id: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PrintFlowCfg {
    /// Release the state machine before identifier/persistence/print work.
    #[default]
    Acknowledge,
    /// Hold the state machine until the printer reports back.
    Confirmed,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct PrinterSection {
    /// Device or spool file labels are appended to. Absent: log-only printer.
    pub device: Option<String>,
    pub flow: PrintFlowCfg,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StorageSection {
    pub data_dir: String,
    pub epc_prefix: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: "data".into(),
            epc_prefix: DEFAULT_EPC_PREFIX.into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SimulationSection {
    /// Peak-to-peak noise added to every simulated reading.
    pub noise: f64,
    pub seed: u64,
    /// Load profile as `[weight, seconds]` pairs, played in order.
    pub segments: Vec<(f64, f64)>,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            noise: 0.004,
            seed: 0x5EED,
            segments: vec![(0.0, 1.0), (9.0, 2.5), (8.0, 2.5), (2.0, 2.5), (0.0, 2.0)],
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub fsm: FsmSection,
    pub stability: StabilitySection,
    pub scale: ScaleSection,
    pub batch: BatchSection,
    pub printer: PrinterSection,
    pub storage: StorageSection,
    pub logging: Logging,
    pub simulation: SimulationSection,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read and parse a config file. Validation is left to the caller.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))
}

pub fn load_trace_csv(path: &std::path::Path) -> eyre::Result<Vec<TraceRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open trace CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["t", "value", "unit", "stable"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "trace CSV must have headers 't,value,unit,stable', got: {}",
            actual.join(",")
        );
    }

    let mut rows: Vec<TraceRow> = Vec::new();
    for (idx, rec) in rdr.deserialize::<TraceRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        if !row.t.is_finite() || !row.value.is_finite() {
            eyre::bail!("CSV row {} has a non-finite number", idx + 2);
        }
        if let Some(prev) = rows.last()
            && row.t < prev.t
        {
            eyre::bail!(
                "trace timestamps must be non-decreasing (row {}: {} < {})",
                idx + 2,
                row.t,
                prev.t
            );
        }
        rows.push(row);
    }
    if rows.is_empty() {
        eyre::bail!("trace CSV {:?} has no rows", path);
    }
    Ok(rows)
}

fn is_hex_prefix(s: &str) -> bool {
    s.len() == 15 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // FSM
        if !(self.fsm.settle_seconds >= 0.0 && self.fsm.settle_seconds.is_finite()) {
            eyre::bail!("fsm.settle_seconds must be >= 0");
        }
        if !(self.fsm.clear_seconds > 0.0 && self.fsm.clear_seconds.is_finite()) {
            eyre::bail!("fsm.clear_seconds must be > 0");
        }
        if self.fsm.min_samples == 0 {
            eyre::bail!("fsm.min_samples must be >= 1");
        }
        if !(self.fsm.empty_threshold > 0.0 && self.fsm.empty_threshold.is_finite()) {
            eyre::bail!("fsm.empty_threshold must be > 0");
        }
        if !(self.fsm.eps > 0.0 && self.fsm.eps.is_finite()) {
            eyre::bail!("fsm.eps must be > 0");
        }
        if !(0.0..=1.0).contains(&self.fsm.eps_align) {
            eyre::bail!("fsm.eps_align must be in [0.0, 1.0]");
        }

        // Stability
        if !(self.stability.sigma > 0.0 && self.stability.sigma.is_finite()) {
            eyre::bail!("stability.sigma must be > 0");
        }
        if !(self.stability.eps > 0.0 && self.stability.eps.is_finite()) {
            eyre::bail!("stability.eps must be > 0");
        }
        if !(0.0..=1.0).contains(&self.stability.eps_align) {
            eyre::bail!("stability.eps_align must be in [0.0, 1.0]");
        }
        if !(self.stability.window_seconds > 0.0 && self.stability.window_seconds.is_finite()) {
            eyre::bail!("stability.window_seconds must be > 0");
        }
        if self.stability.min_samples == 0 {
            eyre::bail!("stability.min_samples must be >= 1");
        }

        // Scale
        if self.scale.sample_rate_hz == 0 {
            eyre::bail!("scale.sample_rate_hz must be > 0");
        }
        if self.scale.read_timeout_ms == 0 {
            eyre::bail!("scale.read_timeout_ms must be >= 1");
        }
        if self.scale.unit.trim().is_empty() {
            eyre::bail!("scale.unit must not be empty");
        }

        // Batch
        if !(self.batch.placement_min_weight > 0.0 && self.batch.placement_min_weight.is_finite()) {
            eyre::bail!("batch.placement_min_weight must be > 0");
        }
        if self.batch.placement_min_weight <= self.fsm.empty_threshold {
            eyre::bail!("batch.placement_min_weight must exceed fsm.empty_threshold");
        }

        // Storage
        if self.storage.data_dir.trim().is_empty() {
            eyre::bail!("storage.data_dir must not be empty");
        }
        if !is_hex_prefix(&self.storage.epc_prefix) {
            eyre::bail!("storage.epc_prefix must be exactly 15 hex characters");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Simulation
        if !(self.simulation.noise >= 0.0 && self.simulation.noise.is_finite()) {
            eyre::bail!("simulation.noise must be >= 0");
        }
        for (w, secs) in &self.simulation.segments {
            if !w.is_finite() || *w < 0.0 {
                eyre::bail!("simulation.segments weights must be finite and >= 0");
            }
            if !(secs.is_finite() && *secs > 0.0) {
                eyre::bail!("simulation.segments durations must be > 0");
            }
        }

        Ok(())
    }
}
