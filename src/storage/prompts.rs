//! Static list of auto-prompts and random prompt selection.
//!
//! The list is a JSON array of strings. It seeds `/random-prompt` alongside
//! prompts that already have cached images.

use std::collections::HashMap;
use std::path::Path;

use rand::seq::SliceRandom;

use crate::core::models::prompt_key;
use crate::error::{RelayError, Result};
use crate::storage::image_cache::ImageCache;

/// Auto-prompts indexed by cache key.
#[derive(Debug, Clone, Default)]
pub struct AutoPrompts {
    by_key: HashMap<String, String>,
}

impl AutoPrompts {
    /// Load from a JSON array file; a missing file yields an empty list.
    ///
    /// # Errors
    /// Returns an error if the file exists but is not a JSON array of strings.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Auto-prompt list not found");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let prompts: Vec<String> = serde_json::from_str(&content).map_err(|e| {
            RelayError::Config(format!("invalid prompt list {}: {e}", path.display()))
        })?;
        Ok(Self::from_prompts(prompts))
    }

    #[must_use]
    pub fn from_prompts<I, S>(prompts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let by_key = prompts
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.trim().is_empty())
            .map(|p| (prompt_key(&p), p))
            .collect();
        Self { by_key }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.by_key.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.by_key.keys()
    }
}

/// Pick a random prompt.
///
/// Candidates are the cached prompt keys, plus the auto-prompt keys unless
/// `cache_only` is set. Returns `None` when there is nothing to choose from.
///
/// # Errors
/// Returns an error if the cache cannot be listed or a chosen entry's
/// metadata record cannot be read.
pub fn random_prompt(
    cache: &ImageCache,
    auto: &AutoPrompts,
    cache_only: bool,
) -> Result<Option<String>> {
    let mut candidates = cache.keys()?;
    if !cache_only {
        for key in auto.keys() {
            if !candidates.contains(key) {
                candidates.push(key.clone());
            }
        }
    }

    let Some(key) = candidates.choose(&mut rand::thread_rng()).cloned() else {
        return Ok(None);
    };
    if let Some(prompt) = auto.get(&key) {
        return Ok(Some(prompt.to_string()));
    }
    cache.prompt_for(&key).map(Some)
}
