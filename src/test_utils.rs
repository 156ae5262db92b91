//! Test utilities for imgrelay.
//!
//! Provides shared helpers, test data factories, scripted collaborators,
//! and assertion macros for use across all test modules.
//!
//! # Usage
//!
//! ```rust,ignore
//! use imgrelay::test_utils::*;
//!
//! let dir = TestDir::new();
//! let png = make_test_png_bytes(16, 16);
//! let backend = ScriptedBackend::new(vec![Ok(vec!["http://img/1".into()])]);
//! ```

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Cursor, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::core::generation::GenerationBackend;
use crate::core::models::Credential;
use crate::core::scraper::SessionScraper;
use crate::error::{RelayError, Result};
use crate::storage::image_cache::ImageCache;

// =============================================================================
// Test Data Factories
// =============================================================================

/// Solid-colour RGB image of the given size.
#[must_use]
pub fn make_test_image(width: u32, height: u32, shade: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(
        width,
        height,
        Rgb([shade, 128, 255 - shade]),
    ))
}

/// `count` distinct images of the same size.
#[must_use]
pub fn make_test_images(count: u8, width: u32, height: u32) -> Vec<DynamicImage> {
    (0..count)
        .map(|i| make_test_image(width, height, i.wrapping_mul(40)))
        .collect()
}

/// PNG-encoded bytes of a test image, suitable for serving from a mock server.
///
/// # Panics
///
/// Panics if encoding fails.
#[must_use]
pub fn make_test_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    make_test_image(width, height, 7)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("Failed to encode test PNG");
    bytes
}

/// Write a cache entry for `prompt` with `count` small images.
///
/// # Panics
///
/// Panics if the write fails.
pub fn seed_cache_entry(cache: &ImageCache, prompt: &str, count: u8) -> Vec<String> {
    cache
        .write(prompt, &make_test_images(count, 8, 8))
        .expect("Failed to seed cache entry")
}

/// Sample config file exercising every section.
#[must_use]
pub fn make_test_config_toml() -> String {
    r#"[server]
host = "127.0.0.1"
port = 40000

[remote]
api_base = "http://127.0.0.1:9/api/labs"
poll_interval_ms = 10
max_poll_attempts = 20

[scraper]
username = "relay@example.com"
password = "hunter2"
timeout_seconds = 5
"#
    .to_string()
}

// =============================================================================
// Scripted Collaborators
// =============================================================================

/// [`GenerationBackend`] that replays scripted outcomes and records tokens.
pub struct ScriptedBackend {
    outcomes: Mutex<VecDeque<Result<Vec<String>>>>,
    tokens: Mutex<Vec<String>>,
    delay: Duration,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new(outcomes: Vec<Result<Vec<String>>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            tokens: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Sleep this long inside every `submit`.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Tokens seen by `submit`, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().expect("tokens lock").clone()
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.tokens().len()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn submit(&self, _prompt: &str, credential: &Credential) -> Result<Vec<String>> {
        self.tokens
            .lock()
            .expect("tokens lock")
            .push(credential.token.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.outcomes.lock().expect("outcomes lock").pop_front();
        next.unwrap_or_else(|| Err(RelayError::Config("script exhausted".to_string())))
    }
}

/// [`SessionScraper`] that hands out `sess-scraped-<n>` tokens, or fails.
pub struct StaticScraper {
    calls: AtomicUsize,
    fail: bool,
}

impl StaticScraper {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    /// A scraper whose every attempt times out.
    #[must_use]
    pub const fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StaticScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionScraper for StaticScraper {
    async fn scrape(&self) -> Result<Credential> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(RelayError::ScrapeTimeout { seconds: 1 });
        }
        Ok(Credential::new(format!("sess-scraped-{n}")))
    }
}

// =============================================================================
// Temporary Directories
// =============================================================================

/// Isolated temporary directory that is removed on drop.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// Create a new isolated temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the temporary directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file in the temporary directory with the given content.
    ///
    /// Creates parent directories as needed.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be created or written.
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.inner.path().join(name);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }

        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_bytes())
            .expect("Failed to write test file");
    }

    /// Read a file from the temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.inner.path().join(name))
    }

    /// Get the full path to a file in the temporary directory.
    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = &$haystack;
        let needle = &$needle;
        assert!(
            haystack.contains(needle.as_ref() as &str),
            "Expected to find {:?} in:\n{}",
            needle,
            haystack
        );
    };
}
