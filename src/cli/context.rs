//! Wiring of resolved configuration into live components.

use std::sync::Arc;

use crate::core::credentials::CredentialStore;
use crate::core::generation::GenerationClient;
use crate::core::images::ImageFetcher;
use crate::core::orchestrator::Orchestrator;
use crate::core::scraper::BrowserScraper;
use crate::error::Result;
use crate::storage::config::ResolvedConfig;
use crate::storage::image_cache::ImageCache;

/// Open the credential store at the configured location.
///
/// # Errors
/// Returns an error if an existing record cannot be read.
pub fn credential_store(config: &ResolvedConfig) -> Result<CredentialStore> {
    CredentialStore::open(config.paths.credential_file(), config.api_token.clone())
}

/// Build the orchestrator with the production collaborators.
///
/// # Errors
/// Returns an error if directories, the credential record, or HTTP clients
/// cannot be set up.
pub fn orchestrator(config: &ResolvedConfig) -> Result<Orchestrator> {
    config.paths.ensure_dirs()?;

    let credentials = Arc::new(credential_store(config)?);
    let backend = Arc::new(GenerationClient::new(config.generation.clone())?);
    let scraper = Arc::new(BrowserScraper::new(config.scraper.clone()));
    let fetcher = ImageFetcher::new(config.generation.request_timeout)?;
    let cache = ImageCache::open(config.paths.images_dir())?;

    tracing::debug!(
        data_dir = %config.paths.data.display(),
        api_base = %config.generation.api_base,
        "Components assembled"
    );

    Ok(Orchestrator::new(
        credentials,
        backend,
        scraper,
        fetcher,
        cache,
        config.orchestrator.clone(),
    ))
}
