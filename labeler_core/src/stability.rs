//! Sliding-window stability detector.
//!
//! Keeps every sample whose timestamp lies within `window_seconds` of the
//! newest one and derives mean, population standard deviation and a
//! stability verdict. The verdict needs both a range check and a dispersion
//! check: range alone is fooled by bimodal noise, sigma alone by one outlier.

use std::collections::VecDeque;

use crate::config::StabilityConfig;
use crate::sample::WeightSample;

/// Default placement threshold until a batch sets its own.
pub const DEFAULT_PLACEMENT_MIN_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct StabilityDetector {
    cfg: StabilityConfig,
    /// (timestamp, value), oldest at the front.
    window: VecDeque<(f64, f64)>,
    mean: f64,
    std_dev: f64,
    stable: bool,
    placement_min_weight: f64,
}

impl Default for StabilityDetector {
    fn default() -> Self {
        Self::new(StabilityConfig::default())
    }
}

impl StabilityDetector {
    pub fn new(cfg: StabilityConfig) -> Self {
        Self {
            cfg,
            window: VecDeque::new(),
            mean: 0.0,
            std_dev: 0.0,
            stable: false,
            placement_min_weight: DEFAULT_PLACEMENT_MIN_WEIGHT,
        }
    }

    pub fn config(&self) -> &StabilityConfig {
        &self.cfg
    }

    /// Append a sample, evict everything older than the window relative to it,
    /// and recompute statistics and verdict.
    pub fn add_sample(&mut self, sample: &WeightSample) {
        self.window.push_back((sample.timestamp, sample.value));

        let newest = sample.timestamp;
        while let Some(&(t, _)) = self.window.front() {
            if newest - t > self.cfg.window_seconds {
                self.window.pop_front();
            } else {
                break;
            }
        }

        self.recompute();
    }

    /// Clear the window; statistics drop to zero and the verdict to `false`.
    /// The placement threshold is kept.
    pub fn reset(&mut self) {
        self.window.clear();
        self.mean = 0.0;
        self.std_dev = 0.0;
        self.stable = false;
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }

    pub fn is_stable(&self) -> bool {
        self.stable
    }

    /// Number of samples currently retained in the window.
    pub fn total_samples(&self) -> usize {
        self.window.len()
    }

    /// Peak-to-peak range of the retained window (0 when empty).
    pub fn range(&self) -> f64 {
        let mut it = self.window.iter().map(|&(_, v)| v);
        let Some(first) = it.next() else {
            return 0.0;
        };
        let (lo, hi) = it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        hi - lo
    }

    pub fn placement_min_weight(&self) -> f64 {
        self.placement_min_weight
    }

    pub fn set_placement_min_weight(&mut self, value: f64) {
        self.placement_min_weight = value;
    }

    fn recompute(&mut self) {
        let n = self.window.len();
        if n == 0 {
            return;
        }
        let nf = n as f64;
        self.mean = self.window.iter().map(|&(_, v)| v).sum::<f64>() / nf;
        self.std_dev = if n > 1 {
            let mean = self.mean;
            let var = self
                .window
                .iter()
                .map(|&(_, v)| (v - mean) * (v - mean))
                .sum::<f64>()
                / nf;
            var.sqrt()
        } else {
            0.0
        };

        self.stable = if n < self.cfg.min_samples {
            false
        } else {
            self.range() <= self.cfg.eps && self.std_dev <= self.cfg.sigma
        };
    }
}
