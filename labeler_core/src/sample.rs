//! Weight sample value type.

/// One timestamped weight reading as seen by the state machine.
///
/// `timestamp` is monotonic seconds; callers filter non-finite values before
/// handing samples to the detector or the FSM.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightSample {
    pub value: f64,
    pub unit: String,
    pub timestamp: f64,
}

impl WeightSample {
    pub fn new(value: f64, unit: impl Into<String>, timestamp: f64) -> Self {
        Self {
            value,
            unit: unit.into(),
            timestamp,
        }
    }

    /// Shorthand for kilogram samples.
    pub fn kg(value: f64, timestamp: f64) -> Self {
        Self::new(value, "kg", timestamp)
    }
}
