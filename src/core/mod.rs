//! Core models and the generation pipeline.

pub mod credentials;
pub mod generation;
pub mod http;
pub mod images;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod scraper;

pub use credentials::CredentialStore;
pub use generation::{GenerationBackend, GenerationClient, GenerationSettings};
pub use images::ImageFetcher;
pub use models::{
    AutopilotResponse, CacheEntry, Credential, Generated, GenerationTask, ImageSource, PromptMeta,
    TaskStatus, prompt_key,
};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use scraper::{BrowserScraper, ScraperSettings, SessionScraper};
