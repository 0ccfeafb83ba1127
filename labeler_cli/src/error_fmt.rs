//! Human-readable error descriptions, structured JSON errors and exit codes.

use thiserror::Error;

pub const EXIT_GENERIC: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_CONFIG: i32 = 3;
pub const EXIT_STORAGE: i32 = 4;

/// Failures the CLI classifies itself before they reach `humanize`.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("usage: {0}")]
    Usage(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("storage: {0}")]
    Storage(#[from] labeler_store::StoreError),
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use labeler_core::error::{BuildError, LabelerError};

    // Typed matches first
    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::Usage(msg) => format!(
                "What happened: {msg}.\nLikely causes: A required option was not given and the config has no fallback.\nHow to fix: See `labeler_cli run --help`."
            ),
            CliError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. Unset keys fall back to defaults."
            ),
            CliError::Storage(se) => format!(
                "What happened: Local storage failed ({se}).\nLikely causes: storage.data_dir is not writable, is a file, or the disk is full.\nHow to fix: Point storage.data_dir at a writable directory and check free space."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid tuning ({msg}).\nLikely causes: Out-of-range [fsm] or [stability] values.\nHow to fix: Edit the config file, then rerun."
            ),
            other => format!(
                "What happened: The batch service could not be assembled ({other}).\nLikely causes: Internal wiring error.\nHow to fix: Re-run with --log-level=debug and report the output."
            ),
        };
    }

    if let Some(le) = err.downcast_ref::<LabelerError>() {
        return format!(
            "What happened: {le}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // String-based heuristics for errors coming from device setup
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("trace csv must have headers") {
        return "Invalid headers in trace CSV. Expected 't,value,unit,stable'.".to_string();
    }

    if lower.contains("invalid load profile") {
        return format!(
            "What happened: The simulation profile is unusable ({msg}).\nLikely causes: Empty [simulation] segments or a segment with non-positive duration.\nHow to fix: Give every segment as [weight, seconds] with seconds > 0."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 usage, 3 config invalid, 4 storage, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use labeler_core::error::{BuildError, LabelerError};

    match err.downcast_ref::<CliError>() {
        Some(CliError::Usage(_)) => return EXIT_USAGE,
        Some(CliError::Config(_)) => return EXIT_CONFIG,
        Some(CliError::Storage(_)) => return EXIT_STORAGE,
        None => {}
    }
    if matches!(err.downcast_ref::<BuildError>(), Some(BuildError::InvalidConfig(_)))
        || matches!(err.downcast_ref::<LabelerError>(), Some(LabelerError::Config(_)))
    {
        return EXIT_CONFIG;
    }
    if err.downcast_ref::<labeler_store::StoreError>().is_some() {
        return EXIT_STORAGE;
    }
    EXIT_GENERIC
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match exit_code_for_error(err) {
        EXIT_USAGE => "Usage",
        EXIT_CONFIG => "ConfigInvalid",
        EXIT_STORAGE => "Storage",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
