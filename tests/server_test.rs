//! End-to-end tests for the HTTP service.
//!
//! Each test binds an ephemeral port, runs the real accept loop, and talks to
//! it with reqwest. Generation goes through a scripted backend.

mod common;

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use wiremock::MockServer;

use imgrelay::core::generation::GenerationBackend;
use imgrelay::core::models::prompt_key;
use imgrelay::error::RelayError;
use imgrelay::server::{self, AppState};
use imgrelay::storage::prompts::AutoPrompts;
use imgrelay::test_utils::{ScriptedBackend, StaticScraper, TestDir, seed_cache_entry};

use common::logger::TestLogger;

struct Running {
    base: String,
    state: Arc<AppState>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<imgrelay::Result<()>>,
}

impl Running {
    async fn start(data_dir: &Path, backend: Arc<dyn GenerationBackend>, prompts: AutoPrompts) -> Self {
        let orchestrator = common::orchestrator(
            data_dir,
            "sess-live",
            backend,
            Arc::new(StaticScraper::new()),
        );
        let state = Arc::new(AppState {
            orchestrator: Arc::new(orchestrator),
            prompts,
        });
        let listener = server::bind("127.0.0.1", 0).await.expect("bind");
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server::serve(listener, Arc::clone(&state), async move {
            let _ = stopped.await;
        }));
        Self {
            base,
            state,
            stop: Some(stop),
            task,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task.await.expect("join").expect("serve");
    }
}

fn idle_backend() -> Arc<ScriptedBackend> {
    Arc::new(ScriptedBackend::new(Vec::new()))
}

#[tokio::test]
async fn health_reports_cache_and_rotation() {
    let log = TestLogger::new("health_reports_cache_and_rotation");
    let dir = TestDir::new();
    let running = Running::start(dir.path(), idle_backend(), AutoPrompts::default()).await;
    seed_cache_entry(running.state.orchestrator.cache(), "seeded", 4);

    log.http_request("GET", "/health");
    let body: Value = reqwest::get(running.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["cached_prompts"], 1);
    assert_eq!(body["rotation_count"], 0);
    running.shutdown().await;
    log.finish_ok();
}

#[tokio::test]
async fn random_prompt_empty_cache_is_not_found() {
    let dir = TestDir::new();
    let running = Running::start(dir.path(), idle_backend(), AutoPrompts::default()).await;

    let response = reqwest::get(running.url("/random-prompt")).await.unwrap();

    assert_eq!(response.status(), 404);
    running.shutdown().await;
}

#[tokio::test]
async fn random_prompt_returns_cached_text() {
    let dir = TestDir::new();
    let running = Running::start(
        dir.path(),
        idle_backend(),
        AutoPrompts::from_prompts(["from the auto list"]),
    )
    .await;
    seed_cache_entry(running.state.orchestrator.cache(), "only cached prompt", 4);

    let response = reqwest::get(running.url("/random-prompt")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "only cached prompt");

    let widened = reqwest::get(running.url("/random-prompt?cache_only=false"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(
        widened == "only cached prompt" || widened == "from the auto list",
        "got {widened}"
    );
    running.shutdown().await;
}

#[tokio::test]
async fn autopilot_serves_cached_prompt_without_generating() {
    let log = TestLogger::new("autopilot_serves_cached_prompt_without_generating");
    let dir = TestDir::new();
    let backend = idle_backend();
    let running = Running::start(dir.path(), backend.clone(), AutoPrompts::default()).await;
    seed_cache_entry(running.state.orchestrator.cache(), "a quiet harbor", 6);

    log.http_request("GET", "/autopilot/a%20quiet%20harbor");
    let body: Value = reqwest::get(running.url("/autopilot/a%20quiet%20harbor"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["success"], true);
    assert_eq!(body["prompt"], "a quiet harbor");
    let paths = body["image_paths"].as_array().unwrap();
    assert_eq!(paths.len(), 4);
    let key = prompt_key("a quiet harbor");
    assert!(paths.iter().all(|p| p.as_str().unwrap().starts_with(&key)));
    assert_eq!(backend.calls(), 0);
    running.shutdown().await;
    log.finish_ok();
}

#[tokio::test]
async fn generate_produces_and_serves_images() {
    let log = TestLogger::new("generate_produces_and_serves_images");
    let dir = TestDir::new();
    let images = MockServer::start().await;
    let urls = common::mount_images(&images, 4).await;
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(urls)]));
    let running = Running::start(dir.path(), backend.clone(), AutoPrompts::default()).await;

    log.phase("generate");
    let body: Value = reqwest::get(running.url("/generate/misty%20forest"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["prompt"], "misty forest");
    let paths: Vec<String> = body["image_paths"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_str().unwrap().to_string())
        .collect();
    assert_eq!(paths.len(), 4);
    assert_eq!(backend.calls(), 1);

    log.phase("fetch image");
    let response = reqwest::get(running.url(&format!("/image/{}", paths[0])))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/webp");
    let bytes = response.bytes().await.unwrap();
    let decoded = image::load_from_memory(&bytes).expect("webp decodes");
    assert_eq!((decoded.width(), decoded.height()), (16, 12));

    running.shutdown().await;
    log.finish_ok();
}

#[tokio::test]
async fn generation_failure_falls_back_to_cached_prompt() {
    let dir = TestDir::new();
    let backend = Arc::new(ScriptedBackend::new(vec![Err(RelayError::TaskFailed {
        task_id: "task-9".to_string(),
        status: "failed".to_string(),
    })]));
    let running = Running::start(dir.path(), backend, AutoPrompts::default()).await;
    seed_cache_entry(running.state.orchestrator.cache(), "backup prompt", 4);

    let response = reqwest::get(running.url("/autopilot/never%20works")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    assert_eq!(body["success"], false);
    assert_eq!(body["prompt"], "backup prompt");
    assert_eq!(body["image_paths"].as_array().unwrap().len(), 4);
    running.shutdown().await;
}

#[tokio::test]
async fn generation_failure_with_empty_cache_returns_empty_payload() {
    let dir = TestDir::new();
    let backend = Arc::new(ScriptedBackend::new(vec![
        Err(RelayError::Auth { status: 401 }),
        Err(RelayError::Auth { status: 401 }),
    ]));
    let running = Running::start(dir.path(), backend, AutoPrompts::default()).await;

    let body: Value = reqwest::get(running.url("/generate/anything"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["success"], false);
    assert_eq!(body["prompt"], "");
    assert!(body["image_paths"].as_array().unwrap().is_empty());
    running.shutdown().await;
}

#[tokio::test]
async fn image_route_rejects_unknown_and_traversal_paths() {
    let dir = TestDir::new();
    let running = Running::start(dir.path(), idle_backend(), AutoPrompts::default()).await;
    let paths = seed_cache_entry(running.state.orchestrator.cache(), "guarded", 4);
    let key = prompt_key("guarded");

    for probe in [
        format!("/image/{key}/meta.json"),
        format!("/image/{key}/..%2F..%2Fkeys.json"),
        format!("/image/{key}/99.webp"),
        "/image/not-a-key/0.webp".to_string(),
    ] {
        let response = reqwest::get(running.url(&probe)).await.unwrap();
        assert_eq!(response.status(), 404, "{probe}");
    }

    let ok = reqwest::get(running.url(&format!("/image/{}", paths[0]))).await.unwrap();
    assert_eq!(ok.status(), 200);
    running.shutdown().await;
}

#[tokio::test]
async fn cors_and_method_handling() {
    let dir = TestDir::new();
    let running = Running::start(dir.path(), idle_backend(), AutoPrompts::default()).await;
    let client = reqwest::Client::new();

    let preflight = client
        .request(reqwest::Method::OPTIONS, running.url("/autopilot/x"))
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), 204);
    assert_eq!(preflight.headers()["access-control-allow-origin"], "*");

    let post = client.post(running.url("/health")).send().await.unwrap();
    assert_eq!(post.status(), 405);

    let missing = client.get(running.url("/nope")).send().await.unwrap();
    assert_eq!(missing.status(), 404);
    assert_eq!(missing.headers()["access-control-allow-origin"], "*");

    running.shutdown().await;
}
