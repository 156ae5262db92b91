//! Error types for imgrelay.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors are categorized into six main categories:
//! - **Authentication**: The stored session token was rejected or could not be renewed
//! - **Network**: Connection, timeout, or transport issues
//! - **Remote**: The generation API misbehaved (5xx streaks, failed tasks, bad requests)
//! - **Cache**: Invariant violations of the on-disk image cache
//! - **Configuration**: Config file parsing, validation, or missing values
//! - **Internal**: I/O, serialization, cancellation, unclassified
//!
//! Each error has a stable error code (e.g., `RELAY-A001`) for programmatic handling.
//!
//! Only [`RelayError::Auth`] is recoverable inside a generation: the orchestrator
//! renews the session once and retries. Everything else aborts the request and
//! is turned into a fallback payload by the HTTP layer.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Session token rejected, scraping failed.
    Authentication,
    /// Transport issues (timeout, connection refused, DNS).
    Network,
    /// The remote generation API reported a failure.
    Remote,
    /// Image cache invariant violations.
    Cache,
    /// Configuration issues (parse errors, invalid values, missing files).
    Configuration,
    /// Internal errors (I/O, serialization, cancellation).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Authentication => "Authentication error",
            Self::Network => "Network error",
            Self::Remote => "Remote API error",
            Self::Cache => "Cache error",
            Self::Configuration => "Configuration error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Authentication => "A",
            Self::Network => "N",
            Self::Remote => "R",
            Self::Cache => "K",
            Self::Configuration => "C",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Credential rejected and could not be renewed
    AuthFailure = 2,
    /// Invalid configuration or arguments
    ConfigError = 3,
    /// Timeout or cancellation
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Main error type for imgrelay operations.
#[derive(Error, Debug)]
pub enum RelayError {
    // ==========================================================================
    // Authentication errors (Category: Authentication)
    // ==========================================================================
    /// The remote API rejected the bearer token (401/403-class).
    #[error("credential rejected by generation API (HTTP {status})")]
    Auth { status: u16 },

    /// No session token appeared in the page before the deadline.
    #[error("no session token observed after {seconds}s")]
    ScrapeTimeout { seconds: u64 },

    /// A browser-driven step (launch, navigation, element wait, input) failed.
    #[error("browser automation failed: {0}")]
    Automation(String),

    /// The renewed credential could not be persisted.
    #[error("failed to persist credential to {}: {message}", .path.display())]
    Persistence { path: PathBuf, message: String },

    // ==========================================================================
    // Remote errors (Category: Remote)
    // ==========================================================================
    /// Too many consecutive 5xx responses.
    #[error("generation API unavailable: {consecutive} consecutive server errors (last HTTP {status})")]
    ServerUnavailable { consecutive: u32, status: u16 },

    /// Non-auth 4xx from the generation API.
    #[error("generation API rejected request (HTTP {status}): {message}")]
    Request { status: u16, message: String },

    /// The remote task finished without images.
    #[error("generation task {task_id} ended with status '{status}'")]
    TaskFailed { task_id: String, status: String },

    /// The task never reached a terminal status within the poll budget.
    #[error("generation task {task_id} still pending after {attempts} polls")]
    PollTimeout { task_id: String, attempts: u32 },

    /// Failed to parse a response body.
    #[error("failed to parse response: {0}")]
    ParseResponse(String),

    /// A downloaded image could not be decoded.
    #[error("failed to decode image from {url}: {message}")]
    Decode { url: String, message: String },

    // ==========================================================================
    // Network errors (Category: Network)
    // ==========================================================================
    /// Request timed out.
    #[error("request timeout after {0} seconds")]
    Timeout(u64),

    /// Generic transport error.
    #[error("network error: {0}")]
    Network(String),

    // ==========================================================================
    // Cache errors (Category: Cache)
    // ==========================================================================
    /// A directory for this prompt key already exists.
    #[error("cache entry {key} already exists")]
    CacheCollision { key: String },

    /// Not enough images cached for a read.
    #[error("cache entry {key} holds {available} image(s), {required} required")]
    InsufficientCache {
        key: String,
        available: usize,
        required: usize,
    },

    /// No cache entry for this key.
    #[error("no cache entry for {key}")]
    CacheMiss { key: String },

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    // ==========================================================================
    // Internal errors (Category: Internal)
    // ==========================================================================
    /// The caller's deadline passed before the generation finished.
    #[error("generation cancelled after {elapsed_ms}ms")]
    Cancelled { elapsed_ms: u64 },

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RelayError {
    /// Map error to a CLI exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::Auth { .. }
            | Self::ScrapeTimeout { .. }
            | Self::Automation(_)
            | Self::Persistence { .. } => ExitCode::AuthFailure,

            Self::Config(_) => ExitCode::ConfigError,

            Self::Timeout(_) | Self::PollTimeout { .. } | Self::Cancelled { .. } => {
                ExitCode::Timeout
            }

            Self::ServerUnavailable { .. }
            | Self::Request { .. }
            | Self::TaskFailed { .. }
            | Self::ParseResponse(_)
            | Self::Decode { .. }
            | Self::Network(_)
            | Self::CacheCollision { .. }
            | Self::InsufficientCache { .. }
            | Self::CacheMiss { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth { .. }
            | Self::ScrapeTimeout { .. }
            | Self::Automation(_)
            | Self::Persistence { .. } => ErrorCategory::Authentication,

            Self::ServerUnavailable { .. }
            | Self::Request { .. }
            | Self::TaskFailed { .. }
            | Self::PollTimeout { .. }
            | Self::ParseResponse(_)
            | Self::Decode { .. } => ErrorCategory::Remote,

            Self::Timeout(_) | Self::Network(_) => ErrorCategory::Network,

            Self::CacheCollision { .. }
            | Self::InsufficientCache { .. }
            | Self::CacheMiss { .. } => ErrorCategory::Cache,

            Self::Config(_) => ErrorCategory::Configuration,

            Self::Cancelled { .. } | Self::Io(_) | Self::Json(_) | Self::Other(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `RELAY-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "RELAY-A001",
            Self::ScrapeTimeout { .. } => "RELAY-A002",
            Self::Automation(_) => "RELAY-A003",
            Self::Persistence { .. } => "RELAY-A004",

            Self::ServerUnavailable { .. } => "RELAY-R001",
            Self::Request { .. } => "RELAY-R002",
            Self::TaskFailed { .. } => "RELAY-R003",
            Self::PollTimeout { .. } => "RELAY-R004",
            Self::ParseResponse(_) => "RELAY-R005",
            Self::Decode { .. } => "RELAY-R006",

            Self::Timeout(_) => "RELAY-N001",
            Self::Network(_) => "RELAY-N002",

            Self::CacheCollision { .. } => "RELAY-K001",
            Self::InsufficientCache { .. } => "RELAY-K002",
            Self::CacheMiss { .. } => "RELAY-K003",

            Self::Config(_) => "RELAY-C001",

            Self::Cancelled { .. } => "RELAY-X001",
            Self::Io(_) => "RELAY-X002",
            Self::Json(_) => "RELAY-X003",
            Self::Other(_) => "RELAY-X099",
        }
    }

    /// Whether a later, independent attempt could plausibly succeed.
    ///
    /// Nothing inside a single generation retries on this; it only informs
    /// callers deciding whether to try again later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ServerUnavailable { .. }
                | Self::PollTimeout { .. }
                | Self::Timeout(_)
                | Self::Network(_)
                | Self::ScrapeTimeout { .. }
                | Self::CacheCollision { .. }
        )
    }

    /// Whether this error should trigger the one-shot credential renewal.
    #[must_use]
    pub const fn triggers_credential_refresh(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Map a reqwest transport error, keeping timeouts distinct.
    #[must_use]
    pub fn from_transport(err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout_secs)
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Result type alias for imgrelay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
