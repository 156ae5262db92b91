//! Structured logging setup.
//!
//! Human, compact, or JSON lines to stderr (or a file). Tokens never reach the
//! log: callers log [`Credential::fingerprint`](crate::core::models::Credential::fingerprint).
//!
//! Precedence for the level: `--log-level`, then `IMGRELAY_LOG`, then info.
//! `-v` lifts anything quieter than debug to debug. `RUST_LOG`, when set,
//! replaces the computed filter entirely.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

pub const LOG_LEVEL_ENV: &str = "IMGRELAY_LOG";
pub const LOG_FORMAT_ENV: &str = "IMGRELAY_LOG_FORMAT";
pub const LOG_FILE_ENV: &str = "IMGRELAY_LOG_FILE";

/// Noisy dependencies are capped at this level unless `RUST_LOG` says otherwise.
const DEPENDENCY_DIRECTIVES: &str = "hyper=warn,hyper_util=warn,reqwest=warn,tungstenite=warn";

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per event, with span close timings.
    Json,
    Compact,
}

impl LogFormat {
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "pretty" | "text" => Some(Self::Human),
            "json" | "jsonl" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Minimum severity that gets logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a level name; accepts a few common aliases.
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" | "verbose" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "critical" | "crit" => Some(Self::Error),
            _ => None,
        }
    }

    #[must_use]
    pub const fn directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Resolved logging options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Append to this file instead of writing to stderr.
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// Resolve from CLI flags and the process environment.
    #[must_use]
    pub fn resolve(cli_level: Option<&str>, json: bool, verbose: bool) -> Self {
        Self::resolve_with(cli_level, json, verbose, |key| std::env::var(key).ok())
    }

    /// Resolve from CLI flags and an explicit environment lookup.
    /// Unparsable values are ignored.
    #[must_use]
    pub fn resolve_with<F>(cli_level: Option<&str>, json: bool, verbose: bool, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let mut level = cli_level
            .and_then(LogLevel::from_arg)
            .or_else(|| non_empty(LOG_LEVEL_ENV).and_then(|v| LogLevel::from_arg(&v)))
            .unwrap_or_default();
        if verbose && level > LogLevel::Debug {
            level = LogLevel::Debug;
        }

        let format = if json {
            LogFormat::Json
        } else {
            non_empty(LOG_FORMAT_ENV)
                .and_then(|v| LogFormat::from_arg(&v))
                .unwrap_or_default()
        };

        let file = non_empty(LOG_FILE_ENV).map(|v| PathBuf::from(v.trim()));

        Self {
            level,
            format,
            file,
        }
    }

    /// Filter directives applied when `RUST_LOG` is not set.
    #[must_use]
    pub fn directives(&self) -> String {
        format!("imgrelay={},{DEPENDENCY_DIRECTIVES}", self.level.directive())
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directives()))
    }

    fn writer(&self) -> BoxMakeWriter {
        let file = self.file.as_ref().and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| eprintln!("warning: cannot open log file {}: {e}", path.display()))
                .ok()
        });
        file.map_or_else(
            || BoxMakeWriter::new(std::io::stderr),
            |f: File| BoxMakeWriter::new(Mutex::new(f)),
        )
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(settings: &LogSettings) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(settings.filter())
        .with_writer(settings.writer());

    // try_init fails only when a subscriber is already installed (tests).
    let _ = match settings.format {
        LogFormat::Json => builder
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .try_init(),
        LogFormat::Compact => builder.compact().with_target(true).try_init(),
        LogFormat::Human => builder.with_target(false).try_init(),
    };
}
