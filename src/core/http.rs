//! HTTP client utilities.
//!
//! Provides the shared client used for the generation API and image downloads.

use std::time::Duration;

use reqwest::{Client, ClientBuilder, Response, StatusCode};

use crate::error::{RelayError, Result};

/// Longest error body kept in error messages.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("imgrelay/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| RelayError::Network(e.to_string()))
}

/// Whether the status means the bearer token was refused.
#[must_use]
pub fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

/// Read a failed response's body for an error message, truncated.
pub async fn error_body(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    truncate_text(body.trim(), MAX_ERROR_BODY_CHARS)
}

/// Truncate on a char boundary, appending an ellipsis when cut.
#[must_use]
pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max_chars).collect();
    out.push('…');
    out
}
