//! Core data models shared by the relay components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// =============================================================================
// Credential
// =============================================================================

/// The single live bearer credential for the generation API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Bearer token value.
    pub token: String,
    /// When this token was obtained.
    pub issued_at: DateTime<Utc>,
    /// How many times the credential has been renewed.
    pub rotation_count: u64,
}

impl Credential {
    /// Create a credential issued now with no rotation history.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            issued_at: Utc::now(),
            rotation_count: 0,
        }
    }

    /// The credential that replaces `self` after a renewal.
    #[must_use]
    pub fn rotated(&self, token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            issued_at: Utc::now(),
            rotation_count: self.rotation_count + 1,
        }
    }

    /// Short, non-reversible identifier safe for logs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.token.as_bytes());
        hex::encode(&digest[..4])
    }
}

// =============================================================================
// Generation Task
// =============================================================================

/// Local view of a remote task's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Still running (any non-terminal status string).
    Pending,
    /// Images are ready.
    Succeeded,
    /// The remote side gave up.
    Failed,
}

impl TaskStatus {
    /// Classify a raw status string from the API.
    #[must_use]
    pub fn from_api(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "succeeded" => Self::Succeeded,
            "failed" | "rejected" | "canceled" | "cancelled" => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// Whether polling can stop.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Remote task as seen by the client while polling.
#[derive(Debug, Clone)]
pub struct GenerationTask {
    pub id: String,
    pub status: TaskStatus,
    /// Result locations in server order; empty until succeeded.
    pub result_urls: Vec<String>,
}

// =============================================================================
// Cache Entry
// =============================================================================

/// Metadata record stored next to the images of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMeta {
    pub prompt: String,
}

/// A committed cache directory and its images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    /// Hex hash of the prompt; also the directory name.
    pub prompt_key: String,
    /// Source prompt text from the metadata record.
    pub prompt_text: String,
    /// Relative paths (`<key>/<file>`), sorted by file name.
    pub image_paths: Vec<String>,
}

/// Compute the cache key for a prompt.
#[must_use]
pub fn prompt_key(prompt: &str) -> String {
    hex::encode(Sha256::digest(prompt.as_bytes()))
}

// =============================================================================
// Generation result
// =============================================================================

/// Where the images of a [`Generated`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    /// Produced by the remote API during this call.
    Fresh,
    /// Served from the cache (possibly filled by a concurrent call).
    Cached,
}

/// Result of an orchestrated generation.
#[derive(Debug, Clone, Serialize)]
pub struct Generated {
    pub prompt: String,
    pub prompt_key: String,
    pub image_paths: Vec<String>,
    pub source: ImageSource,
}

/// Response body of `/autopilot` and `/generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutopilotResponse {
    pub success: bool,
    pub prompt: String,
    pub image_paths: Vec<String>,
}
