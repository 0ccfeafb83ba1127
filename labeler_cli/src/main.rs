#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cli;
mod error_fmt;
mod logging;
mod run;

use clap::Parser;
use cli::{Cli, Commands, JSON_MODE};
use error_fmt::{CliError, EXIT_USAGE, exit_code_for_error, format_error_json, humanize};
use std::path::Path;

fn main() {
    let _ = color_eyre::install();

    let cli = match Cli::try_parse() {
        Ok(c) => c,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_USAGE } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        tracing::error!(error = %e, "command failed");
        std::process::exit(exit_code_for_error(&e));
    }
}

/// Missing file means built-in defaults; anything unreadable or invalid is a
/// config error.
fn load_config(path: &Path) -> eyre::Result<labeler_config::Config> {
    let cfg = if path.exists() {
        labeler_config::load_file(path).map_err(|e| CliError::Config(e.to_string()))?
    } else {
        labeler_config::Config::default()
    };
    cfg.validate().map_err(|e| CliError::Config(e.to_string()))?;
    Ok(cfg)
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli.config)?;

    let level = cli
        .log_level
        .clone()
        .or_else(|| cfg.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    logging::init(cli.json, &level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    match cli.cmd {
        Commands::Run {
            product,
            batch_id,
            trace,
            placement_min_weight,
            events,
        } => run::run_batch(
            &cfg,
            &run::RunOpts {
                product,
                batch_id,
                trace,
                placement_min_weight,
                events,
            },
            cli.json,
        ),
        Commands::Drain => run::drain(&cfg),
        Commands::SelfCheck => run::self_check(&cfg, cli.json),
    }
}
