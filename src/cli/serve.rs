//! `serve` command: run the HTTP service until Ctrl-C.

use std::sync::Arc;

use crate::cli::context;
use crate::error::Result;
use crate::server::{self, AppState};
use crate::storage::config::ResolvedConfig;
use crate::storage::prompts::AutoPrompts;

/// Execute the serve command.
///
/// # Errors
/// Returns an error if setup or binding fails.
pub async fn execute(config: &ResolvedConfig) -> Result<()> {
    let orchestrator = Arc::new(context::orchestrator(config)?);
    let prompts = AutoPrompts::load(&config.paths.prompts_file())?;
    tracing::info!(
        auto_prompts = prompts.len(),
        host_source = %config.sources.host,
        port_source = %config.sources.port,
        "Starting image relay"
    );

    let listener = server::bind(&config.host, config.port).await?;
    let state = Arc::new(AppState {
        orchestrator,
        prompts,
    });
    server::serve(listener, state, server::shutdown_signal()).await
}
