//! Generation flow: cache lookup, submit, one-shot credential renewal,
//! download, and cache write.
//!
//! Callers only see images or an error; the credential machinery stays
//! internal. Work for one prompt key is single-flight: concurrent callers for
//! the same prompt queue behind the first and reuse its cache entry.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use image::DynamicImage;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::core::credentials::CredentialStore;
use crate::core::generation::GenerationBackend;
use crate::core::images::ImageFetcher;
use crate::core::models::{Credential, Generated, ImageSource, prompt_key};
use crate::core::scraper::SessionScraper;
use crate::error::{RelayError, Result};
use crate::storage::image_cache::ImageCache;

/// Tunables for [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Deadline applied by [`Orchestrator::generate`].
    pub generation_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_secs(900),
        }
    }
}

/// Ties credentials, scraper, remote API, and cache into one `generate` call.
pub struct Orchestrator {
    credentials: Arc<CredentialStore>,
    backend: Arc<dyn GenerationBackend>,
    scraper: Arc<dyn SessionScraper>,
    fetcher: ImageFetcher,
    cache: ImageCache,
    settings: OrchestratorSettings,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    refresh: Mutex<()>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        credentials: Arc<CredentialStore>,
        backend: Arc<dyn GenerationBackend>,
        scraper: Arc<dyn SessionScraper>,
        fetcher: ImageFetcher,
        cache: ImageCache,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            credentials,
            backend,
            scraper,
            fetcher,
            cache,
            settings,
            in_flight: DashMap::new(),
            refresh: Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn cache(&self) -> &ImageCache {
        &self.cache
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Generate (or reuse) images for `prompt` within the configured timeout.
    ///
    /// # Errors
    /// See [`Self::generate_until`].
    pub async fn generate(&self, prompt: &str) -> Result<Generated> {
        self.generate_until(prompt, Instant::now() + self.settings.generation_timeout)
            .await
    }

    /// Generate (or reuse) images for `prompt`, giving up at `deadline`.
    ///
    /// # Errors
    /// [`RelayError::Cancelled`] when the deadline passes; otherwise the first
    /// unrecoverable error from the remote API, the scraper, the downloads,
    /// or the cache. Only the first authentication failure is recovered from.
    pub async fn generate_until(&self, prompt: &str, deadline: Instant) -> Result<Generated> {
        let started = Instant::now();
        let key = prompt_key(prompt);

        let outcome = tokio::time::timeout_at(deadline, self.run_exclusive(prompt, &key)).await;
        self.release_key(&key);

        outcome.map_err(|_| {
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(prompt_key = %key, elapsed_ms, "Generation cancelled at deadline");
            RelayError::Cancelled { elapsed_ms }
        })?
    }

    async fn run_exclusive(&self, prompt: &str, key: &str) -> Result<Generated> {
        let lock = self
            .in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock_owned().await;

        if self.cache.has(key) {
            tracing::debug!(prompt_key = %key, "Serving existing cache entry");
            return Ok(Generated {
                prompt: prompt.to_string(),
                prompt_key: key.to_string(),
                image_paths: self.cache.read_cached(key)?,
                source: ImageSource::Cached,
            });
        }

        let urls = self.submit_with_refresh(prompt).await?;
        let images = self.fetcher.fetch_all(&urls).await?;
        let image_paths = self.store(prompt, images).await?;

        Ok(Generated {
            prompt: prompt.to_string(),
            prompt_key: key.to_string(),
            image_paths,
            source: ImageSource::Fresh,
        })
    }

    /// Drop the key's lock once nobody else holds or awaits it.
    fn release_key(&self, key: &str) {
        self.in_flight
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn submit_with_refresh(&self, prompt: &str) -> Result<Vec<String>> {
        let credential = self.credentials.current();
        match self.backend.submit(prompt, &credential).await {
            Err(e) if e.triggers_credential_refresh() => {
                tracing::warn!(
                    error = %e,
                    fingerprint = %credential.fingerprint(),
                    "Credential rejected, renewing"
                );
                let renewed = self.renew_credential(&credential).await?;
                self.backend.submit(prompt, &renewed).await
            }
            other => other,
        }
    }

    /// Renew the credential that just failed, unless someone already did.
    async fn renew_credential(&self, failed: &Credential) -> Result<Credential> {
        let _guard = self.refresh.lock().await;

        let live = self.credentials.current();
        if live.token != failed.token {
            tracing::debug!(
                rotation_count = live.rotation_count,
                "Credential already renewed by a concurrent request"
            );
            return Ok(live);
        }

        let scraped = self.scraper.scrape().await?;
        self.credentials.rotate(&scraped.token).await
    }

    async fn store(&self, prompt: &str, images: Vec<DynamicImage>) -> Result<Vec<String>> {
        let cache = self.cache.clone();
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || cache.write(&prompt, &images))
            .await
            .map_err(|e| RelayError::Other(anyhow::anyhow!("cache writer panicked: {e}")))?
    }
}
