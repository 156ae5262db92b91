//! imgrelay - image generation relay
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use imgrelay::cli::{self, Cli};
use imgrelay::core::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_settings = logging::LogSettings::resolve(cli.log_level.as_deref(), cli.json_output, cli.verbose);
    logging::init(&log_settings);

    match cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), category = %e.category(), "{e}");
            eprintln!("error[{}]: {e}", e.error_code());
            eprintln!("  ({})", e.category().description());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
