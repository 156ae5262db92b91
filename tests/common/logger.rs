//! Structured test logging with phase and duration tracking.
#![allow(dead_code)]
//!
//! # Usage
//!
//! ```rust,ignore
//! let log = TestLogger::new("generation_retries_once");
//! log.phase("setup");
//! // ...
//! log.phase("execute");
//! // ...
//! log.finish_ok();
//! ```
//!
//! # Environment Variables
//!
//! - `TEST_LOG_LEVEL` - Minimum level: debug, info, warn, error (default: info)
//! - `TEST_LOG_JSON` - Set to "1" or "true" for one JSON object per line

use std::env;
use std::fmt::Display;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "debug" | "trace" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

#[derive(Serialize)]
struct LogEntry<'a> {
    timestamp: String,
    level: LogLevel,
    test: &'a str,
    phase: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
}

struct Settings {
    min_level: LogLevel,
    json: bool,
}

fn settings() -> &'static Settings {
    static SETTINGS: OnceLock<Settings> = OnceLock::new();
    SETTINGS.get_or_init(|| Settings {
        min_level: env::var("TEST_LOG_LEVEL")
            .ok()
            .and_then(|s| LogLevel::parse(&s))
            .unwrap_or(LogLevel::Info),
        json: env::var("TEST_LOG_JSON").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
    })
}

/// Per-test logger.
pub struct TestLogger {
    test_name: String,
    start_time: Instant,
    current_phase: Mutex<String>,
}

impl TestLogger {
    #[must_use]
    pub fn new(test_name: &str) -> Self {
        let logger = Self {
            test_name: test_name.to_string(),
            start_time: Instant::now(),
            current_phase: Mutex::new("init".to_string()),
        };
        logger.log(LogLevel::Info, "Test starting", None);
        logger
    }

    /// Set the current phase (setup, execute, verify).
    pub fn phase(&self, phase: &str) {
        if let Ok(mut current) = self.current_phase.lock() {
            *current = phase.to_string();
        }
        self.log(LogLevel::Debug, &format!("Phase: {phase}"), None);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, None);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, None);
    }

    pub fn http_request(&self, method: &str, url: &str) {
        self.debug(&format!("HTTP {method} {url}"));
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn finish_ok(&self) {
        let duration_ms = self.start_time.elapsed().as_millis() as u64;
        self.log(
            LogLevel::Info,
            &format!("Test passed (duration: {duration_ms}ms)"),
            Some(duration_ms),
        );
    }

    fn log(&self, level: LogLevel, message: &str, duration_ms: Option<u64>) {
        let settings = settings();
        if level < settings.min_level {
            return;
        }
        let phase = self
            .current_phase
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default();
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();

        if settings.json {
            let entry = LogEntry {
                timestamp,
                level,
                test: &self.test_name,
                phase: &phase,
                message,
                duration_ms,
            };
            if let Ok(json) = serde_json::to_string(&entry) {
                eprintln!("{json}");
            }
        } else {
            eprintln!("[{timestamp}] [{level}] [{}:{phase}] {message}", self.test_name);
        }
    }
}
