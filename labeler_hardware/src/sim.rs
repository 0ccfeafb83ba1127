//! Scripted scale: a piecewise-constant load profile plus deterministic noise.

use std::time::Duration;

use labeler_traits::{BoxError, Reading, WeightSource};

use crate::error::{HwError, Result};

/// Readings the device flags stable once this long into a segment.
const STABLE_HINT_AFTER: f64 = 0.5;

/// Plays `[weight, seconds]` segments at a fixed sample rate.
///
/// Time is virtual: each `read` advances one sample period. Pacing is the
/// caller's job (see `Ingest::spawn`). The stream ends after the last segment.
#[derive(Debug, Clone)]
pub struct SimulatedScale {
    segments: Vec<(f64, f64)>,
    noise: f64,
    rng: u64,
    unit: String,
    period: f64,
    tick: u64,
}

impl SimulatedScale {
    pub fn new(segments: Vec<(f64, f64)>, sample_rate_hz: u32, unit: impl Into<String>) -> Result<Self> {
        if sample_rate_hz == 0 {
            return Err(HwError::Profile("sample rate must be > 0".into()));
        }
        if segments.is_empty() {
            return Err(HwError::Profile("no segments".into()));
        }
        if let Some((w, s)) = segments
            .iter()
            .find(|(w, s)| !w.is_finite() || !s.is_finite() || *s <= 0.0)
        {
            return Err(HwError::Profile(format!("bad segment [{w}, {s}]")));
        }
        Ok(Self {
            segments,
            noise: 0.0,
            rng: 0x5EED,
            unit: unit.into(),
            period: 1.0 / f64::from(sample_rate_hz),
            tick: 0,
        })
    }

    pub fn from_config(sim: &labeler_config::SimulationSection, scale: &labeler_config::ScaleSection) -> Result<Self> {
        Ok(Self::new(sim.segments.clone(), scale.sample_rate_hz, scale.unit.clone())?
            .with_noise(sim.noise, sim.seed))
    }

    /// Peak-to-peak noise amplitude; a zero seed is bumped so xorshift never sticks.
    pub fn with_noise(mut self, noise: f64, seed: u64) -> Self {
        self.noise = noise.max(0.0);
        self.rng = seed.max(1);
        self
    }

    pub fn total_seconds(&self) -> f64 {
        self.segments.iter().map(|(_, s)| s).sum()
    }

    /// Weight and time-into-segment at virtual time `t`, or `None` past the end.
    fn segment_at(&self, t: f64) -> Option<(f64, f64)> {
        let mut start = 0.0;
        for &(weight, secs) in &self.segments {
            if t < start + secs {
                return Some((weight, t - start));
            }
            start += secs;
        }
        None
    }

    fn next_noise(&mut self) -> f64 {
        if self.noise == 0.0 {
            return 0.0;
        }
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng = x;
        #[allow(clippy::cast_precision_loss)]
        let unit = (x >> 11) as f64 / (1u64 << 53) as f64;
        (unit - 0.5) * self.noise
    }
}

impl WeightSource for SimulatedScale {
    fn read(&mut self, _timeout: Duration) -> std::result::Result<Option<Reading>, BoxError> {
        #[allow(clippy::cast_precision_loss)]
        let t = self.tick as f64 * self.period;
        let Some((weight, into)) = self.segment_at(t) else {
            return Ok(None);
        };
        self.tick += 1;
        let value = weight + self.next_noise();
        Ok(Some(Reading::new(value, self.unit.clone(), into >= STABLE_HINT_AFTER)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noiseless_profile_plays_exact_weights() {
        let mut s = SimulatedScale::new(vec![(0.0, 0.1), (2.5, 0.1)], 20, "kg").unwrap();
        let mut values = Vec::new();
        while let Some(r) = s.read(Duration::ZERO).unwrap() {
            values.push(r.value);
        }
        assert_eq!(values, vec![0.0, 0.0, 2.5, 2.5]);
    }

    #[test]
    fn noise_stays_within_amplitude() {
        let mut s = SimulatedScale::new(vec![(5.0, 10.0)], 50, "kg")
            .unwrap()
            .with_noise(0.01, 42);
        while let Some(r) = s.read(Duration::ZERO).unwrap() {
            assert!((r.value - 5.0).abs() <= 0.005 + 1e-12);
        }
    }
}
