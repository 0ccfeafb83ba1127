//! Runtime tuning records for the batch state machine and the stability detector.
//!
//! These are separate from the TOML-deserialized config in `labeler_config`;
//! see `conversions` for the mapping.

/// State machine tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct FsmConfig {
    /// Minimum dwell time in `Loading` before stability is evaluated (s).
    pub settle_seconds: f64,
    /// Continuous time below `empty_threshold` before the platform counts as cleared (s).
    pub clear_seconds: f64,
    /// Minimum detector sample count before leaving `Loading`.
    pub min_samples: usize,
    /// Weight below which the platform is "empty".
    pub empty_threshold: f64,
    /// Absolute weight-change tolerance.
    pub eps: f64,
    /// Proportional weight-change tolerance, multiplied by the reference weight.
    pub eps_align: f64,
}

impl Default for FsmConfig {
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

impl FsmConfig {
    /// Allowed deviation around `weight` before a change is significant:
    /// `max(eps, weight * eps_align)`. Degenerates to `eps` at zero load.
    #[inline]
    pub fn change_limit(&self, weight: f64) -> f64 {
        change_limit(self.eps, self.eps_align, weight)
    }
}

/// Stability detector tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityConfig {
    /// Maximum tolerated population standard deviation over the window.
    pub sigma: f64,
    /// Maximum tolerated peak-to-peak range over the window.
    pub eps: f64,
    /// Proportional tolerance, mirrors `FsmConfig::eps_align`. Carried for parity;
    /// the verdict itself compares the range against `eps` alone.
    pub eps_align: f64,
    /// Sliding window length (s).
    pub window_seconds: f64,
    /// Samples required before the verdict can be `true`.
    pub min_samples: usize,
}

impl Default for StabilityConfig {
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

/// Hybrid absolute/proportional tolerance shared by the FSM and detector.
#[inline]
pub fn change_limit(eps: f64, eps_align: f64, weight: f64) -> f64 {
    eps.max(weight * eps_align)
}
