//! Storage for configuration, credentials, prompts, and cached images.

pub mod config;
pub mod image_cache;
pub mod paths;
pub mod prompts;

pub use config::{
    Config, ConfigSource, ConfigSources, DEFAULT_PORT, ENV_API_BASE, ENV_API_TOKEN, ENV_CONFIG,
    ENV_DATA_DIR, ENV_HOST, ENV_PORT, ENV_SCRAPER_PASSWORD, ENV_SCRAPER_USERNAME, ResolvedConfig,
};
pub use image_cache::{ImageCache, READ_SAMPLE_SIZE};
pub use paths::AppPaths;
pub use prompts::{AutoPrompts, random_prompt};
