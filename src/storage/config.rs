//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux/macOS: `~/.config/imgrelay/config.toml`
//! - Windows: `%APPDATA%/imgrelay/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `IMGRELAY_CONFIG`: Override config file path
//! - `IMGRELAY_HOST` / `IMGRELAY_PORT`: Listen address
//! - `IMGRELAY_API_BASE`: Generation API base URL
//! - `IMGRELAY_DATA_DIR`: Data directory
//! - `IMGRELAY_API_TOKEN`: Seed token used when no credential record exists
//! - `IMGRELAY_SCRAPER_USERNAME` / `IMGRELAY_SCRAPER_PASSWORD`: Login account

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::cli::args::Cli;
use crate::core::generation::{DEFAULT_API_BASE, DEFAULT_BATCH_SIZE, GenerationSettings};
use crate::core::orchestrator::OrchestratorSettings;
use crate::core::scraper::{DEFAULT_LOGIN_URL, DEFAULT_TOKEN_PREFIX, ScraperSettings};
use crate::error::{RelayError, Result};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "IMGRELAY_CONFIG";
/// Environment variable for the listen host.
pub const ENV_HOST: &str = "IMGRELAY_HOST";
/// Environment variable for the listen port.
pub const ENV_PORT: &str = "IMGRELAY_PORT";
/// Environment variable for the generation API base URL.
pub const ENV_API_BASE: &str = "IMGRELAY_API_BASE";
/// Environment variable for the data directory.
pub const ENV_DATA_DIR: &str = "IMGRELAY_DATA_DIR";
/// Environment variable for the seed API token.
pub const ENV_API_TOKEN: &str = "IMGRELAY_API_TOKEN";
/// Environment variable for the scraper login name.
pub const ENV_SCRAPER_USERNAME: &str = "IMGRELAY_SCRAPER_USERNAME";
/// Environment variable for the scraper password.
pub const ENV_SCRAPER_PASSWORD: &str = "IMGRELAY_SCRAPER_PASSWORD";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 32553;

const MAX_TIMEOUT_SECONDS: u64 = 3600;

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Fully resolved configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub host: String,
    pub port: u16,
    pub paths: AppPaths,
    /// Seed token for a fresh credential store.
    pub api_token: Option<String>,
    pub generation: GenerationSettings,
    pub scraper: ScraperSettings,
    pub orchestrator: OrchestratorSettings,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub host: ConfigSource,
    pub port: ConfigSource,
    pub data_dir: ConfigSource,
    pub api_base: ConfigSource,
    pub scraper_account: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI args, environment variables, and config file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file exists but is invalid
    /// - Any resolved value is invalid (e.g., unparsable port)
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let config = Self::load_config()?;
        Self::resolve_with(cli, &config, |key| std::env::var(key).ok())
    }

    /// Resolve against an explicit config and environment lookup.
    ///
    /// # Errors
    /// Returns an error if the config fails validation or an env value is malformed.
    pub fn resolve_with<F>(cli: &Cli, config: &Config, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        config.validate()?;
        let mut sources = ConfigSources::default();
        let serve = cli.serve_args();
        let file_source = if config.loaded_from.is_some() {
            ConfigSource::ConfigFile
        } else {
            ConfigSource::Default
        };

        // Host
        let host = if let Some(host) = serve.and_then(|s| s.host.clone()) {
            sources.host = ConfigSource::Cli;
            host
        } else if let Some(host) = env(ENV_HOST) {
            sources.host = ConfigSource::Env;
            host
        } else {
            sources.host = file_source;
            config.server.host.clone()
        };

        // Port
        let port = if let Some(port) = serve.and_then(|s| s.port) {
            sources.port = ConfigSource::Cli;
            port
        } else if let Some(raw) = env(ENV_PORT) {
            sources.port = ConfigSource::Env;
            raw.trim()
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| RelayError::Config(format!("Invalid {ENV_PORT} value \"{raw}\"")))?
        } else {
            sources.port = file_source;
            config.server.port
        };

        // Data directory
        let paths = if let Some(dir) = &cli.data_dir {
            sources.data_dir = ConfigSource::Cli;
            AppPaths::with_data_dir(dir)
        } else if let Some(dir) = env(ENV_DATA_DIR) {
            sources.data_dir = ConfigSource::Env;
            AppPaths::with_data_dir(dir)
        } else if let Some(dir) = &config.storage.data_dir {
            sources.data_dir = ConfigSource::ConfigFile;
            AppPaths::with_data_dir(dir)
        } else {
            sources.data_dir = ConfigSource::Default;
            AppPaths::new()
        };

        // Remote API
        let api_base = if let Some(base) = env(ENV_API_BASE) {
            sources.api_base = ConfigSource::Env;
            base
        } else {
            sources.api_base = file_source;
            config.remote.api_base.clone()
        };
        let generation = GenerationSettings {
            api_base,
            batch_size: config.remote.batch_size,
            poll_interval: Duration::from_millis(config.remote.poll_interval_ms),
            max_poll_attempts: config.remote.max_poll_attempts,
            max_consecutive_server_errors: config.remote.max_consecutive_server_errors,
            request_timeout: Duration::from_secs(config.remote.request_timeout_seconds),
        };

        // Scraper account
        let username = env(ENV_SCRAPER_USERNAME);
        let password = env(ENV_SCRAPER_PASSWORD);
        sources.scraper_account = if username.is_some() || password.is_some() {
            ConfigSource::Env
        } else if config.scraper.username.is_some() {
            ConfigSource::ConfigFile
        } else {
            ConfigSource::Default
        };
        let scraper = ScraperSettings {
            login_url: config.scraper.login_url.clone(),
            username: username.or_else(|| config.scraper.username.clone()),
            password: password.or_else(|| config.scraper.password.clone()),
            browser_path: config.scraper.browser_path.clone(),
            debugging_port: config.scraper.debugging_port,
            headless: config.scraper.headless,
            token_prefix: config.scraper.token_prefix.clone(),
            poll_interval: Duration::from_millis(config.scraper.poll_interval_ms),
            timeout: Duration::from_secs(config.scraper.timeout_seconds),
        };

        let orchestrator = OrchestratorSettings {
            generation_timeout: Duration::from_secs(config.remote.generation_timeout_seconds),
        };

        Ok(Self {
            host,
            port,
            paths,
            api_token: env(ENV_API_TOKEN).filter(|t| !t.trim().is_empty()),
            generation,
            scraper,
            orchestrator,
            sources,
        })
    }

    /// Load config file, respecting IMGRELAY_CONFIG override.
    fn load_config() -> Result<Config> {
        if let Ok(path) = std::env::var(ENV_CONFIG) {
            Config::load_from(Path::new(&path))
        } else {
            Config::load()
        }
    }
}

// =============================================================================
// Config File
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub remote: RemoteConfig,
    pub scraper: ScraperConfig,
    pub storage: StorageConfig,
    /// File the values were read from; `None` when only defaults apply.
    #[serde(skip)]
    pub loaded_from: Option<PathBuf>,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Generation API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub api_base: String,
    /// Images requested per task.
    pub batch_size: u32,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    /// Consecutive 5xx poll responses tolerated before giving up.
    pub max_consecutive_server_errors: u32,
    pub request_timeout_seconds: u64,
    /// Overall deadline for one generation, renewal included.
    pub generation_timeout_seconds: u64,
}

/// Browser login settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub login_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub browser_path: Option<PathBuf>,
    pub debugging_port: u16,
    pub headless: bool,
    pub token_prefix: String,
    pub poll_interval_ms: u64,
    pub timeout_seconds: u64,
}

/// Data location settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval_ms: 1000,
            max_poll_attempts: 600,
            max_consecutive_server_errors: 3,
            request_timeout_seconds: 30,
            generation_timeout_seconds: 900,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            login_url: DEFAULT_LOGIN_URL.to_string(),
            username: None,
            password: None,
            browser_path: None,
            debugging_port: 9222,
            headless: true,
            token_prefix: DEFAULT_TOKEN_PREFIX.to_string(),
            poll_interval_ms: 1000,
            timeout_seconds: 120,
        }
    }
}

impl Config {
    /// Load configuration from the default config file path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    /// Returns error only if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().config_file())
    }

    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    /// Returns error only if the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| RelayError::Config(format!("Invalid config file: {e}")))?;
        config.loaded_from = Some(path.to_path_buf());

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns [`RelayError::Config`] naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(RelayError::Config("Port must be non-zero".to_string()));
        }
        if self.remote.batch_size == 0 {
            return Err(RelayError::Config("batch_size must be at least 1".to_string()));
        }
        if self.remote.poll_interval_ms == 0 || self.scraper.poll_interval_ms == 0 {
            return Err(RelayError::Config(
                "poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.remote.max_poll_attempts == 0 {
            return Err(RelayError::Config(
                "max_poll_attempts must be at least 1".to_string(),
            ));
        }

        for (name, value) in [
            ("request_timeout_seconds", self.remote.request_timeout_seconds),
            (
                "generation_timeout_seconds",
                self.remote.generation_timeout_seconds,
            ),
            ("scraper.timeout_seconds", self.scraper.timeout_seconds),
        ] {
            if value == 0 || value > MAX_TIMEOUT_SECONDS {
                return Err(RelayError::Config(format!(
                    "{name} must be between 1 and {MAX_TIMEOUT_SECONDS} seconds"
                )));
            }
        }

        if self.scraper.token_prefix.is_empty() {
            return Err(RelayError::Config("token_prefix must not be empty".to_string()));
        }

        Ok(())
    }
}
