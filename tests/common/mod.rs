//! Common fixtures for integration tests.
//!
//! # Modules
//!
//! - `logger`: Structured test logging infrastructure
#![allow(dead_code)]

pub mod logger;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use imgrelay::core::credentials::CredentialStore;
use imgrelay::core::generation::GenerationBackend;
use imgrelay::core::images::ImageFetcher;
use imgrelay::core::models::Credential;
use imgrelay::core::orchestrator::{Orchestrator, OrchestratorSettings};
use imgrelay::core::scraper::SessionScraper;
use imgrelay::storage::image_cache::ImageCache;
use imgrelay::test_utils::make_test_png_bytes;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serve `count` PNG images at `/img/<n>.png` and return their URLs.
pub async fn mount_images(server: &MockServer, count: usize) -> Vec<String> {
    let mut urls = Vec::with_capacity(count);
    for n in 0..count {
        let route = format!("/img/{n}.png");
        Mock::given(method("GET"))
            .and(path(route.clone()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(make_test_png_bytes(16, 12)),
            )
            .mount(server)
            .await;
        urls.push(format!("{}{route}", server.uri()));
    }
    urls
}

/// Orchestrator over a temp data dir with the given collaborators.
pub fn orchestrator(
    data_dir: &Path,
    token: &str,
    backend: Arc<dyn GenerationBackend>,
    scraper: Arc<dyn SessionScraper>,
) -> Orchestrator {
    let credentials =
        CredentialStore::with_credential(data_dir.join("keys.json"), Credential::new(token));
    orchestrator_with_store(data_dir, credentials, backend, scraper)
}

/// Orchestrator over a temp data dir with a prepared credential store.
pub fn orchestrator_with_store(
    data_dir: &Path,
    credentials: CredentialStore,
    backend: Arc<dyn GenerationBackend>,
    scraper: Arc<dyn SessionScraper>,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(credentials),
        backend,
        scraper,
        ImageFetcher::new(Duration::from_secs(5)).expect("image fetcher"),
        ImageCache::new(data_dir.join("images")),
        OrchestratorSettings {
            generation_timeout: Duration::from_secs(30),
        },
    )
}
