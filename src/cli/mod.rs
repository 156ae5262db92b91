//! CLI argument parsing and command dispatch.

pub mod args;
pub mod context;
pub mod generate;
pub mod inspect;
pub mod serve;

pub use args::{Cli, Commands};

use crate::error::Result;
use crate::storage::config::ResolvedConfig;

/// Resolve configuration and run the selected command.
///
/// # Errors
/// Whatever the command fails with.
pub async fn run(cli: Cli) -> Result<()> {
    let config = ResolvedConfig::resolve(&cli)?;

    match &cli.command {
        Commands::Serve(_) => serve::execute(&config).await,
        Commands::Generate(args) => generate::execute(args, &config).await,
        Commands::Scrape => generate::scrape(&config).await,
        Commands::Credential(cmd) => inspect::credential(cmd, &config),
        Commands::RandomPrompt(args) => inspect::random(args, &config),
        Commands::Cache(cmd) => inspect::cache(cmd, &config),
    }
}
