//! `From` implementations bridging `labeler_config` sections to runtime types.

use crate::config::{FsmConfig, StabilityConfig};
use crate::service::PrintFlow;

// ── FsmConfig ────────────────────────────────────────────────────────────────

impl From<&labeler_config::FsmSection> for FsmConfig {
    fn from(c: &labeler_config::FsmSection) -> Self {
        Self {
            settle_seconds: c.settle_seconds,
            clear_seconds: c.clear_seconds,
            min_samples: c.min_samples,
            empty_threshold: c.empty_threshold,
            eps: c.eps,
            eps_align: c.eps_align,
        }
    }
}

// ── StabilityConfig ──────────────────────────────────────────────────────────

impl From<&labeler_config::StabilitySection> for StabilityConfig {
    fn from(c: &labeler_config::StabilitySection) -> Self {
        Self {
            sigma: c.sigma,
            eps: c.eps,
            eps_align: c.eps_align,
            window_seconds: c.window_seconds,
            min_samples: c.min_samples,
        }
    }
}

// ── PrintFlow ────────────────────────────────────────────────────────────────

impl From<labeler_config::PrintFlowCfg> for PrintFlow {
    fn from(c: labeler_config::PrintFlowCfg) -> Self {
        match c {
            labeler_config::PrintFlowCfg::Acknowledge => Self::FastAcknowledge,
            labeler_config::PrintFlowCfg::Confirmed => Self::Confirmed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sections_map_to_default_runtime_configs() {
        let cfg = labeler_config::Config::default();
        assert_eq!(FsmConfig::from(&cfg.fsm), FsmConfig::default());
        assert_eq!(StabilityConfig::from(&cfg.stability), StabilityConfig::default());
        assert_eq!(PrintFlow::from(cfg.printer.flow), PrintFlow::FastAcknowledge);
    }

    #[test]
    fn fields_are_carried_over() {
        let section = labeler_config::FsmSection {
            settle_seconds: 0.2,
            clear_seconds: 0.3,
            min_samples: 4,
            empty_threshold: 0.1,
            eps: 0.05,
            eps_align: 0.02,
        };
        let fsm = FsmConfig::from(&section);
        assert_eq!(fsm.min_samples, 4);
        assert!((fsm.change_limit(10.0) - 0.2).abs() < 1e-12);
    }
}
