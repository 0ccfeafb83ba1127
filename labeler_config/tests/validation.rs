use labeler_config::{Config, IngestMode, PrintFlowCfg, load_toml};
use rstest::rstest;

#[test]
fn empty_file_yields_valid_defaults() {
    let cfg = load_toml("").expect("parse TOML");
    assert_eq!(cfg, Config::default());
    cfg.validate().expect("defaults must validate");
    assert_eq!(cfg.fsm.settle_seconds, 0.50);
    assert_eq!(cfg.fsm.clear_seconds, 0.70);
    assert_eq!(cfg.stability.window_seconds, 1.0);
    assert_eq!(cfg.storage.epc_prefix, "3034257BF7194E4");
}

#[test]
fn parses_full_document() {
    let toml = r#"
[fsm]
settle_seconds = 0.4
clear_seconds = 1.0
min_samples = 8
empty_threshold = 0.1
eps = 0.02
eps_align = 0.05

[stability]
sigma = 0.02
window_seconds = 0.8

[scale]
unit = "lb"
sample_rate_hz = 50
mode = "event"

[batch]
placement_min_weight = 0.5
product_id = "CHEESE-1KG"

[printer]
device = "/tmp/labels.txt"
flow = "confirmed"

[storage]
data_dir = "/var/lib/labeler"
epc_prefix = "ABCDEF012345678"

[logging]
level = "debug"
rotation = "daily"

[simulation]
noise = 0.0
segments = [[0, 1.0], [4.5, 3.0]]
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config");
    assert_eq!(cfg.fsm.min_samples, 8);
    assert_eq!(cfg.stability.min_samples, 10, "unset keys keep defaults");
    assert_eq!(cfg.scale.mode, IngestMode::Event);
    assert_eq!(cfg.printer.flow, PrintFlowCfg::Confirmed);
    assert_eq!(cfg.batch.product_id.as_deref(), Some("CHEESE-1KG"));
    assert_eq!(cfg.simulation.segments, vec![(0.0, 1.0), (4.5, 3.0)]);
}

#[rstest]
#[case("[fsm]\nclear_seconds = 0.0", "fsm.clear_seconds must be > 0")]
#[case("[fsm]\nsettle_seconds = -0.1", "fsm.settle_seconds must be >= 0")]
#[case("[fsm]\nmin_samples = 0", "fsm.min_samples must be >= 1")]
#[case("[fsm]\neps_align = 1.5", "fsm.eps_align must be in [0.0, 1.0]")]
#[case("[stability]\nwindow_seconds = 0.0", "stability.window_seconds must be > 0")]
#[case("[stability]\nsigma = -1.0", "stability.sigma must be > 0")]
#[case("[scale]\nsample_rate_hz = 0", "scale.sample_rate_hz must be > 0")]
#[case("[scale]\nread_timeout_ms = 0", "scale.read_timeout_ms must be >= 1")]
#[case(
    "[batch]\nplacement_min_weight = 0.01",
    "batch.placement_min_weight must exceed fsm.empty_threshold"
)]
#[case(
    "[storage]\nepc_prefix = \"XYZ\"",
    "storage.epc_prefix must be exactly 15 hex characters"
)]
#[case(
    "[logging]\nrotation = \"weekly\"",
    "logging.rotation must be one of never|daily|hourly"
)]
#[case(
    "[simulation]\nsegments = [[1.0, 0.0]]",
    "simulation.segments durations must be > 0"
)]
fn rejects_invalid_values(#[case] toml: &str, #[case] expected: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(
        format!("{err}").contains(expected),
        "expected {expected:?}, got {err}"
    );
}

#[test]
fn unknown_enum_value_fails_to_parse() {
    assert!(load_toml("[scale]\nmode = \"turbo\"").is_err());
    assert!(load_toml("[printer]\nflow = \"maybe\"").is_err());
}

#[test]
fn shipped_config_matches_defaults() {
    let cfg = labeler_config::load_toml(include_str!("../../etc/labeler.toml")).unwrap();
    cfg.validate().unwrap();
    let defaults = labeler_config::Config::default();
    assert_eq!(cfg.fsm, defaults.fsm);
    assert_eq!(cfg.stability, defaults.stability);
    assert_eq!(cfg.scale, defaults.scale);
    assert_eq!(cfg.simulation, defaults.simulation);
}
