pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Boxed error used at every device boundary so adapters keep their own types.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One reading as reported by the weighing hardware.
///
/// `stable_hint` is the device's own opinion and is informational only.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub value: f64,
    pub unit: String,
    pub stable_hint: bool,
}

impl Reading {
    pub fn new(value: f64, unit: impl Into<String>, stable_hint: bool) -> Self {
        Self {
            value,
            unit: unit.into(),
            stable_hint,
        }
    }
}

/// Source of weight readings (serial scale, simulator, trace replay).
///
/// `Ok(None)` signals end of stream; errors are transient unless the
/// implementation keeps returning them.
pub trait WeightSource {
    fn read(&mut self, timeout: std::time::Duration) -> Result<Option<Reading>, BoxError>;
}

impl<T: WeightSource + ?Sized> WeightSource for Box<T> {
    fn read(&mut self, timeout: std::time::Duration) -> Result<Option<Reading>, BoxError> {
        (**self).read(timeout)
    }
}

/// Everything a printer needs to produce one label. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelJob {
    pub weight: f64,
    pub unit: String,
    pub epc_code: String,
    pub product_id: String,
}

/// Label printer actuator. May be slow or fail; callers treat failure as non-fatal.
pub trait LabelPrinter: Send + Sync {
    fn print(&self, job: &LabelJob) -> Result<(), BoxError>;
}

impl<F> LabelPrinter for F
where
    F: Fn(&LabelJob) -> Result<(), BoxError> + Send + Sync,
{
    fn print(&self, job: &LabelJob) -> Result<(), BoxError> {
        self(job)
    }
}

/// Generator of unique, ideally monotonic label identifiers.
///
/// Runs on the stabilization hot path, so implementations must not block
/// for an unbounded time.
pub trait EpcSource: Send {
    fn generate_next(&mut self) -> Result<String, BoxError>;
}

impl<T: EpcSource + ?Sized> EpcSource for Box<T> {
    fn generate_next(&mut self) -> Result<String, BoxError> {
        (**self).generate_next()
    }
}
