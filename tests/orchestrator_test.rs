//! Integration tests for the generation flow.
//!
//! Uses a scripted task backend and scraper with images hosted on a mock
//! server, so the full submit -> renew -> download -> cache path runs for real.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use wiremock::MockServer;

use imgrelay::core::credentials::CredentialStore;
use imgrelay::core::models::{Credential, ImageSource, prompt_key};
use imgrelay::error::RelayError;
use imgrelay::test_utils::{ScriptedBackend, StaticScraper, TestDir};

use common::logger::TestLogger;

fn auth_error() -> RelayError {
    RelayError::Auth { status: 401 }
}

#[tokio::test]
async fn fresh_generation_caches_batch() {
    let log = TestLogger::new("fresh_generation_caches_batch");
    log.phase("setup");
    let dir = TestDir::new();
    let server = MockServer::start().await;
    let urls = common::mount_images(&server, 4).await;
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(urls)]));
    let scraper = Arc::new(StaticScraper::new());
    let relay = common::orchestrator(dir.path(), "sess-live", backend.clone(), scraper.clone());

    log.phase("execute");
    let generated = relay.generate("a lighthouse at dusk").await.expect("generate");

    log.phase("verify");
    assert_eq!(generated.source, ImageSource::Fresh);
    assert_eq!(generated.image_paths.len(), 4);
    assert_eq!(generated.prompt_key, prompt_key("a lighthouse at dusk"));
    assert!(relay.cache().has(&generated.prompt_key));
    assert_eq!(
        relay.cache().prompt_for(&generated.prompt_key).unwrap(),
        "a lighthouse at dusk"
    );
    for rel in &generated.image_paths {
        let decoded = image::open(relay.cache().root().join(rel)).expect("stored image decodes");
        assert_eq!((decoded.width(), decoded.height()), (16, 12));
    }
    assert_eq!(backend.tokens(), vec!["sess-live"]);
    assert_eq!(scraper.calls(), 0);
    log.finish_ok();
}

#[tokio::test]
async fn repeat_prompt_is_served_from_cache() {
    let dir = TestDir::new();
    let server = MockServer::start().await;
    let urls = common::mount_images(&server, 4).await;
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(urls)]));
    let relay = common::orchestrator(
        dir.path(),
        "sess-live",
        backend.clone(),
        Arc::new(StaticScraper::new()),
    );

    let first = relay.generate("same prompt").await.unwrap();
    let second = relay.generate("same prompt").await.unwrap();

    assert_eq!(first.source, ImageSource::Fresh);
    assert_eq!(second.source, ImageSource::Cached);
    assert_eq!(second.image_paths.len(), 4);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn auth_failure_renews_and_retries_once() {
    let log = TestLogger::new("auth_failure_renews_and_retries_once");
    log.phase("setup");
    let dir = TestDir::new();
    let server = MockServer::start().await;
    let urls = common::mount_images(&server, 4).await;
    let backend = Arc::new(ScriptedBackend::new(vec![Err(auth_error()), Ok(urls)]));
    let scraper = Arc::new(StaticScraper::new());
    let relay = common::orchestrator(dir.path(), "sess-expired", backend.clone(), scraper.clone());

    log.phase("execute");
    let generated = relay.generate("renew me").await.expect("retry succeeds");

    log.phase("verify");
    assert_eq!(generated.image_paths.len(), 4);
    assert_eq!(backend.tokens(), vec!["sess-expired", "sess-scraped-1"]);
    assert_eq!(scraper.calls(), 1);

    let live = relay.credentials().current();
    assert_eq!(live.token, "sess-scraped-1");
    assert_eq!(live.rotation_count, 1);
    let persisted = std::fs::read_to_string(dir.path().join("keys.json")).unwrap();
    assert!(persisted.contains("sess-scraped-1"));
    log.finish_ok();
}

#[tokio::test]
async fn second_auth_failure_is_fatal_without_second_scrape() {
    let dir = TestDir::new();
    let backend = Arc::new(ScriptedBackend::new(vec![Err(auth_error()), Err(auth_error())]));
    let scraper = Arc::new(StaticScraper::new());
    let relay = common::orchestrator(dir.path(), "sess-expired", backend.clone(), scraper.clone());

    let err = relay.generate("still rejected").await.unwrap_err();

    assert!(matches!(err, RelayError::Auth { .. }), "{err:?}");
    assert_eq!(backend.calls(), 2);
    assert_eq!(scraper.calls(), 1);
    assert!(relay.cache().keys().unwrap().is_empty());
}

#[tokio::test]
async fn scrape_failure_surfaces_and_keeps_credential() {
    let dir = TestDir::new();
    let backend = Arc::new(ScriptedBackend::new(vec![Err(auth_error())]));
    let scraper = Arc::new(StaticScraper::failing());
    let relay = common::orchestrator(dir.path(), "sess-expired", backend.clone(), scraper.clone());

    let err = relay.generate("p").await.unwrap_err();

    assert!(matches!(err, RelayError::ScrapeTimeout { .. }), "{err:?}");
    assert_eq!(backend.calls(), 1);
    assert_eq!(relay.credentials().current().token, "sess-expired");
    assert_eq!(relay.credentials().current().rotation_count, 0);
}

#[tokio::test]
async fn unpersistable_renewal_fails_without_retry() {
    let log = TestLogger::new("unpersistable_renewal_fails_without_retry");
    log.phase("setup");
    let dir = TestDir::new();
    let server = MockServer::start().await;
    let urls = common::mount_images(&server, 4).await;
    // keys.json would live under a regular file, so the record cannot be written.
    dir.create_file("not-a-dir", "x");
    let store = CredentialStore::with_credential(
        dir.file_path("not-a-dir").join("keys.json"),
        Credential::new("sess-expired"),
    );
    let backend = Arc::new(ScriptedBackend::new(vec![Err(auth_error()), Ok(urls)]));
    let scraper = Arc::new(StaticScraper::new());
    let relay =
        common::orchestrator_with_store(dir.path(), store, backend.clone(), scraper.clone());

    log.phase("execute");
    let err = relay.generate("cannot persist").await.unwrap_err();

    log.phase("verify");
    assert!(matches!(err, RelayError::Persistence { .. }), "{err:?}");
    assert_eq!(backend.tokens(), vec!["sess-expired"]);
    assert_eq!(scraper.calls(), 1);
    let live = relay.credentials().current();
    assert_eq!(live.token, "sess-expired");
    assert_eq!(live.rotation_count, 0);
    assert!(relay.cache().keys().unwrap().is_empty());
    log.finish_ok();
}

#[tokio::test]
async fn non_auth_errors_do_not_scrape() {
    let dir = TestDir::new();
    let backend = Arc::new(ScriptedBackend::new(vec![Err(RelayError::ServerUnavailable {
        consecutive: 4,
        status: 500,
    })]));
    let scraper = Arc::new(StaticScraper::new());
    let relay = common::orchestrator(dir.path(), "sess-live", backend.clone(), scraper.clone());

    let err = relay.generate("p").await.unwrap_err();

    assert!(matches!(err, RelayError::ServerUnavailable { .. }));
    assert_eq!(backend.calls(), 1);
    assert_eq!(scraper.calls(), 0);
}

#[tokio::test]
async fn concurrent_same_prompt_generates_once() {
    let log = TestLogger::new("concurrent_same_prompt_generates_once");
    log.phase("setup");
    let dir = TestDir::new();
    let server = MockServer::start().await;
    let urls = common::mount_images(&server, 4).await;
    let backend = Arc::new(
        ScriptedBackend::new(vec![Ok(urls)]).with_delay(Duration::from_millis(100)),
    );
    let relay = Arc::new(common::orchestrator(
        dir.path(),
        "sess-live",
        backend.clone(),
        Arc::new(StaticScraper::new()),
    ));

    log.phase("execute");
    let mut handles = Vec::new();
    for _ in 0..4 {
        let relay = Arc::clone(&relay);
        handles.push(tokio::spawn(async move { relay.generate("popular prompt").await }));
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().expect("every caller gets images"));
    }

    log.phase("verify");
    let fresh = results
        .iter()
        .filter(|g| g.source == ImageSource::Fresh)
        .count();
    assert_eq!(fresh, 1);
    assert_eq!(backend.calls(), 1);

    let key = prompt_key("popular prompt");
    assert_eq!(relay.cache().keys().unwrap(), vec![key.clone()]);
    assert_eq!(relay.cache().image_paths(&key).unwrap().len(), 4);
    let staging: Vec<_> = std::fs::read_dir(relay.cache().root())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
        .collect();
    assert!(staging.is_empty());
    log.finish_ok();
}

#[tokio::test]
async fn concurrent_auth_failures_share_one_renewal() {
    let dir = TestDir::new();
    let server = MockServer::start().await;
    let urls = common::mount_images(&server, 4).await;
    let backend = Arc::new(
        ScriptedBackend::new(vec![
            Err(auth_error()),
            Err(auth_error()),
            Ok(urls.clone()),
            Ok(urls),
        ])
        .with_delay(Duration::from_millis(50)),
    );
    let scraper = Arc::new(StaticScraper::new());
    let relay = Arc::new(common::orchestrator(
        dir.path(),
        "sess-expired",
        backend.clone(),
        scraper.clone(),
    ));

    let a = {
        let relay = Arc::clone(&relay);
        tokio::spawn(async move { relay.generate("prompt a").await })
    };
    let b = {
        let relay = Arc::clone(&relay);
        tokio::spawn(async move { relay.generate("prompt b").await })
    };

    a.await.unwrap().expect("a succeeds");
    b.await.unwrap().expect("b succeeds");

    assert_eq!(scraper.calls(), 1);
    assert_eq!(relay.credentials().current().rotation_count, 1);
    let tokens = backend.tokens();
    assert_eq!(tokens.len(), 4);
    assert_eq!(&tokens[2..], ["sess-scraped-1", "sess-scraped-1"]);
}

#[tokio::test]
async fn deadline_cancels_slow_generation() {
    let dir = TestDir::new();
    let backend = Arc::new(
        ScriptedBackend::new(vec![Ok(vec!["http://unused".to_string()])])
            .with_delay(Duration::from_secs(5)),
    );
    let relay = common::orchestrator(
        dir.path(),
        "sess-live",
        backend,
        Arc::new(StaticScraper::new()),
    );

    let err = relay
        .generate_until("slow", Instant::now() + Duration::from_millis(100))
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Cancelled { .. }), "{err:?}");
    assert!(!relay.cache().has(&prompt_key("slow")));
}

#[tokio::test]
async fn broken_download_leaves_no_entry() {
    let dir = TestDir::new();
    let server = MockServer::start().await;
    let mut urls = common::mount_images(&server, 3).await;
    urls.push(format!("{}/img/missing.png", server.uri()));
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(urls)]));
    let relay = common::orchestrator(
        dir.path(),
        "sess-live",
        backend,
        Arc::new(StaticScraper::new()),
    );

    let err = relay.generate("partial").await.unwrap_err();

    assert!(matches!(err, RelayError::Network(_)), "{err:?}");
    assert!(relay.cache().keys().unwrap().is_empty());
}
