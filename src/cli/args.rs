//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Image generation relay - cache and serve text-to-image results.
#[derive(Parser, Debug)]
#[command(name = "imgrelay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Data directory (credential record, prompt list, image cache)
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP service
    Serve(ServeArgs),

    /// Generate images for one prompt
    Generate(GenerateArgs),

    /// Log in through the browser and store a fresh credential
    Scrape,

    /// Inspect the stored credential
    #[command(subcommand)]
    Credential(CredentialCommand),

    /// Print a random prompt
    RandomPrompt(RandomPromptArgs),

    /// Inspect the image cache
    #[command(subcommand)]
    Cache(CacheCommand),
}

/// Arguments for the `serve` command.
#[derive(Parser, Debug, Default)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, short = 'p', value_name = "PORT")]
    pub port: Option<u16>,
}

/// Arguments for the `generate` command.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Prompt text
    #[arg(value_name = "PROMPT")]
    pub prompt: String,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum CredentialCommand {
    /// Show rotation count, issue time, and token fingerprint
    Show,
}

/// Arguments for the `random-prompt` command.
#[derive(Parser, Debug)]
pub struct RandomPromptArgs {
    /// Also draw from the static auto-prompt list
    #[arg(long)]
    pub include_auto: bool,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// List cached prompts
    List,
}

impl Cli {
    /// Serve arguments, if the `serve` command was chosen.
    #[must_use]
    pub const fn serve_args(&self) -> Option<&ServeArgs> {
        match &self.command {
            Commands::Serve(args) => Some(args),
            _ => None,
        }
    }
}
