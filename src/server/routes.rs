//! Request routing and response mapping.
//!
//! Generation failures never surface as HTTP errors: the client gets a
//! `success: false` payload with a random cached prompt's images instead.

use std::time::Instant;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CACHE_CONTROL, CONTENT_TYPE, HeaderValue,
};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;

use super::AppState;
use crate::core::models::{AutopilotResponse, prompt_key};
use crate::storage::image_cache::ImageCache;
use crate::storage::prompts::random_prompt;

type Body = Full<Bytes>;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";
const WEBP: &str = "image/webp";

/// Entry point for every request.
pub async fn handle<B>(state: &AppState, req: Request<B>) -> Response<Body> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let mut response = route(state, &method, &path, query.as_deref()).await;
    apply_cors(&mut response);

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Request served"
    );
    response
}

async fn route(state: &AppState, method: &Method, path: &str, query: Option<&str>) -> Response<Body> {
    if method == Method::OPTIONS {
        return respond(StatusCode::NO_CONTENT, TEXT, Bytes::new());
    }
    if method != Method::GET {
        return text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    }

    if path == "/health" {
        return health(state);
    }
    if path == "/random-prompt" {
        return random_prompt_route(state, query);
    }
    if let Some(raw) = path.strip_prefix("/autopilot/") {
        return match decode_prompt(raw) {
            Some(prompt) => autopilot(state, &prompt, true).await,
            None => text(StatusCode::BAD_REQUEST, "prompt is required"),
        };
    }
    if let Some(raw) = path.strip_prefix("/generate/") {
        return match decode_prompt(raw) {
            Some(prompt) => autopilot(state, &prompt, false).await,
            None => text(StatusCode::BAD_REQUEST, "prompt is required"),
        };
    }
    if let Some(rest) = path.strip_prefix("/image/") {
        return image(state.orchestrator.cache(), rest).await;
    }

    text(StatusCode::NOT_FOUND, "not found")
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Serialize)]
struct Health {
    status: &'static str,
    cached_prompts: usize,
    rotation_count: u64,
}

fn health(state: &AppState) -> Response<Body> {
    let cached_prompts = state
        .orchestrator
        .cache()
        .keys()
        .map_or(0, |keys| keys.len());
    json(
        StatusCode::OK,
        &Health {
            status: "ok",
            cached_prompts,
            rotation_count: state.orchestrator.credentials().current().rotation_count,
        },
    )
}

fn random_prompt_route(state: &AppState, query: Option<&str>) -> Response<Body> {
    let cache_only = query_flag(query, "cache_only").unwrap_or(true);
    match random_prompt(state.orchestrator.cache(), &state.prompts, cache_only) {
        Ok(Some(prompt)) => text(StatusCode::OK, prompt),
        Ok(None) => text(StatusCode::NOT_FOUND, "no prompts available"),
        Err(e) => {
            tracing::warn!(error = %e, "Random prompt selection failed");
            text(StatusCode::NOT_FOUND, "no prompts available")
        }
    }
}

/// Serve `prompt`, optionally answering straight from the cache first.
async fn autopilot(state: &AppState, prompt: &str, check_cache: bool) -> Response<Body> {
    let cache = state.orchestrator.cache();

    if check_cache {
        let key = prompt_key(prompt);
        if cache.has(&key) {
            match cache.read_cached(&key) {
                Ok(image_paths) => {
                    return json(
                        StatusCode::OK,
                        &AutopilotResponse {
                            success: true,
                            prompt: prompt.to_string(),
                            image_paths,
                        },
                    );
                }
                Err(e) => tracing::debug!(error = %e, "Cached read failed, generating"),
            }
        }
    }

    let body = match state.orchestrator.generate(prompt).await {
        Ok(generated) => AutopilotResponse {
            success: true,
            prompt: generated.prompt,
            image_paths: generated.image_paths,
        },
        Err(e) => {
            tracing::warn!(
                error = %e,
                code = e.error_code(),
                "Generation failed, serving fallback"
            );
            fallback(cache)
        }
    };
    json(StatusCode::OK, &body)
}

/// A random cached prompt's images, or an empty payload if there are none.
fn fallback(cache: &ImageCache) -> AutopilotResponse {
    let cached = cache.random_key().ok().flatten().and_then(|key| {
        let prompt = cache.prompt_for(&key).ok()?;
        let image_paths = cache.read_cached(&key).ok()?;
        Some((prompt, image_paths))
    });

    let (prompt, image_paths) = cached.unwrap_or_default();
    AutopilotResponse {
        success: false,
        prompt,
        image_paths,
    }
}

async fn image(cache: &ImageCache, rest: &str) -> Response<Body> {
    let Some((key, file_name)) = rest.split_once('/') else {
        return text(StatusCode::NOT_FOUND, "not found");
    };
    let file_name = urlencoding::decode(file_name).map_or_else(|_| file_name.to_string(), |d| d.into_owned());
    let Some(path) = cache.resolve(key, &file_name) else {
        return text(StatusCode::NOT_FOUND, "not found");
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mut response = respond(StatusCode::OK, WEBP, bytes);
            response.headers_mut().insert(
                CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=31536000, immutable"),
            );
            response
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Image read failed");
            text(StatusCode::NOT_FOUND, "not found")
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn decode_prompt(raw: &str) -> Option<String> {
    let decoded = urlencoding::decode(raw).ok()?.into_owned();
    (!decoded.trim().is_empty()).then_some(decoded)
}

/// Parse a boolean query parameter; `None` if absent or unparsable.
fn query_flag(query: Option<&str>, name: &str) -> Option<bool> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| match value.to_ascii_lowercase().as_str() {
            "" | "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Body> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn text(status: StatusCode, body: impl Into<String>) -> Response<Body> {
    let body: String = body.into();
    respond(status, TEXT, body)
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(bytes) => respond(status, JSON, bytes),
        Err(e) => {
            tracing::error!(error = %e, "Response serialization failed");
            text(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn apply_cors(response: &mut Response<Body>) {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
}
