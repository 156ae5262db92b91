//! Concurrent download and decode of generated images.

use std::time::Duration;

use futures::future::try_join_all;
use image::DynamicImage;
use reqwest::Client;

use crate::core::http::{build_client, error_body};
use crate::error::{RelayError, Result};

/// Downloads result URLs and decodes them into pixel buffers.
#[derive(Clone)]
pub struct ImageFetcher {
    http: Client,
    timeout: Duration,
}

impl ImageFetcher {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            timeout,
        })
    }

    /// Fetch one image.
    ///
    /// # Errors
    /// Transport failures, non-2xx responses, and undecodable payloads.
    pub async fn fetch(&self, url: &str) -> Result<DynamicImage> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RelayError::from_transport(&e, self.timeout.as_secs()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Network(format!(
                "image download failed (HTTP {}) from {url}: {}",
                status.as_u16(),
                error_body(response).await
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RelayError::from_transport(&e, self.timeout.as_secs()))?;

        let source = url.to_string();
        tokio::task::spawn_blocking(move || {
            image::load_from_memory(&bytes).map_err(|e| RelayError::Decode {
                url: source,
                message: e.to_string(),
            })
        })
        .await
        .map_err(|e| RelayError::Other(anyhow::anyhow!("image decoder panicked: {e}")))?
    }

    /// Fetch every URL concurrently, preserving input order.
    ///
    /// Fails as soon as any single download fails.
    ///
    /// # Errors
    /// The first error among the downloads.
    pub async fn fetch_all(&self, urls: &[String]) -> Result<Vec<DynamicImage>> {
        tracing::debug!(count = urls.len(), "Downloading images");
        try_join_all(urls.iter().map(|url| self.fetch(url))).await
    }
}
