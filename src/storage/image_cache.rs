//! Content-addressed on-disk image cache.
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/<prompt key>/meta.json        {"prompt": "..."}
//! <root>/<prompt key>/<uuid>.webp      one file per generated image
//! <root>/.staging-<uuid>/              in-progress writes, never read
//! ```
//!
//! Entries are append-only per prompt: a write builds the whole directory in
//! a staging area and renames it into place, so a key directory is either
//! absent or complete (metadata record included). Writing a key that already
//! exists fails with [`RelayError::CacheCollision`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use image::{DynamicImage, ImageFormat};
use rand::seq::SliceRandom;
use regex::Regex;
use uuid::Uuid;

use crate::core::models::{CacheEntry, PromptMeta, prompt_key};
use crate::error::{RelayError, Result};

/// Images returned by a cached read.
pub const READ_SAMPLE_SIZE: usize = 4;

/// Metadata record name inside each key directory.
pub const META_FILE: &str = "meta.json";

/// Extension of stored images.
pub const IMAGE_EXTENSION: &str = "webp";

const STAGING_PREFIX: &str = ".staging-";

static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{64}$").expect("valid key regex"));

static FILE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*\.[A-Za-z0-9]+$").expect("valid file name regex")
});

/// Whether `key` looks like a prompt key.
#[must_use]
pub fn is_valid_key(key: &str) -> bool {
    KEY_PATTERN.is_match(key)
}

/// Maps prompt keys to directories of generated images.
#[derive(Debug, Clone)]
pub struct ImageCache {
    root: PathBuf,
}

impl ImageCache {
    /// Use `root` as the cache directory (not created until the first write).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use `root` and make sure it exists.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let cache = Self::new(root);
        fs::create_dir_all(&cache.root)?;
        Ok(cache)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Whether a committed entry exists for `key`.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        is_valid_key(key) && self.key_dir(key).is_dir()
    }

    /// All image paths of an entry (`<key>/<file>`), sorted by file name.
    ///
    /// # Errors
    /// [`RelayError::CacheMiss`] if the entry does not exist.
    pub fn image_paths(&self, key: &str) -> Result<Vec<String>> {
        if !self.has(key) {
            return Err(RelayError::CacheMiss {
                key: key.to_string(),
            });
        }

        let mut names = Vec::new();
        for dir_entry in fs::read_dir(self.key_dir(key))? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let name = dir_entry.file_name().to_string_lossy().to_string();
            if name == META_FILE || name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names.into_iter().map(|name| format!("{key}/{name}")).collect())
    }

    /// Pick [`READ_SAMPLE_SIZE`] distinct images of `key` uniformly at random.
    ///
    /// # Errors
    /// [`RelayError::CacheMiss`] for unknown keys, [`RelayError::InsufficientCache`]
    /// when fewer images are stored.
    pub fn read_cached(&self, key: &str) -> Result<Vec<String>> {
        let paths = self.image_paths(key)?;
        if paths.len() < READ_SAMPLE_SIZE {
            return Err(RelayError::InsufficientCache {
                key: key.to_string(),
                available: paths.len(),
                required: READ_SAMPLE_SIZE,
            });
        }

        let mut rng = rand::thread_rng();
        let mut picked: Vec<String> = paths
            .choose_multiple(&mut rng, READ_SAMPLE_SIZE)
            .cloned()
            .collect();
        picked.shuffle(&mut rng);
        Ok(picked)
    }

    /// Store freshly generated images for `prompt` as a new entry.
    ///
    /// Returns the relative paths of the written images, in input order.
    ///
    /// # Errors
    /// [`RelayError::CacheCollision`] if the entry already exists; I/O or
    /// encoding failures otherwise. Nothing is left behind on failure.
    pub fn write(&self, prompt: &str, images: &[DynamicImage]) -> Result<Vec<String>> {
        let key = prompt_key(prompt);
        let final_dir = self.key_dir(&key);
        if final_dir.exists() {
            return Err(RelayError::CacheCollision { key });
        }

        fs::create_dir_all(&self.root)?;
        let staging = self
            .root
            .join(format!("{STAGING_PREFIX}{}", Uuid::new_v4().simple()));
        fs::create_dir(&staging)?;

        let names = match stage_entry(&staging, prompt, images) {
            Ok(names) => names,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
        };

        if final_dir.exists() {
            let _ = fs::remove_dir_all(&staging);
            return Err(RelayError::CacheCollision { key });
        }
        if let Err(e) = fs::rename(&staging, &final_dir) {
            let _ = fs::remove_dir_all(&staging);
            if final_dir.exists() {
                return Err(RelayError::CacheCollision { key });
            }
            return Err(e.into());
        }

        tracing::info!(prompt_key = %key, images = names.len(), "Cache entry written");
        Ok(names
            .into_iter()
            .map(|name| format!("{key}/{name}"))
            .collect())
    }

    /// Committed keys, in no particular order.
    ///
    /// # Errors
    /// Returns an error if the root exists but cannot be listed.
    pub fn keys(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let name = dir_entry.file_name().to_string_lossy().to_string();
            if is_valid_key(&name) {
                keys.push(name);
            }
        }
        Ok(keys)
    }

    /// A uniformly random committed key, if any.
    ///
    /// # Errors
    /// Returns an error if the root cannot be listed.
    pub fn random_key(&self) -> Result<Option<String>> {
        let keys = self.keys()?;
        Ok(keys.choose(&mut rand::thread_rng()).cloned())
    }

    /// Source prompt text of an entry.
    ///
    /// # Errors
    /// [`RelayError::CacheMiss`] if absent; I/O or JSON errors for a bad record.
    pub fn prompt_for(&self, key: &str) -> Result<String> {
        if !self.has(key) {
            return Err(RelayError::CacheMiss {
                key: key.to_string(),
            });
        }
        let content = fs::read_to_string(self.key_dir(key).join(META_FILE))?;
        let meta: PromptMeta = serde_json::from_str(&content)?;
        Ok(meta.prompt)
    }

    /// Full view of an entry.
    ///
    /// # Errors
    /// Same as [`Self::prompt_for`] and [`Self::image_paths`].
    pub fn entry(&self, key: &str) -> Result<CacheEntry> {
        Ok(CacheEntry {
            prompt_key: key.to_string(),
            prompt_text: self.prompt_for(key)?,
            image_paths: self.image_paths(key)?,
        })
    }

    /// Map a `<key>/<file>` pair to a file on disk.
    ///
    /// Returns `None` for malformed keys or names, the metadata record, and
    /// files that do not exist.
    #[must_use]
    pub fn resolve(&self, key: &str, file_name: &str) -> Option<PathBuf> {
        if !is_valid_key(key) || !FILE_PATTERN.is_match(file_name) || file_name == META_FILE {
            return None;
        }
        let path = self.key_dir(key).join(file_name);
        path.is_file().then_some(path)
    }
}

/// Write images and the metadata record into `dir`; returns file names.
fn stage_entry(dir: &Path, prompt: &str, images: &[DynamicImage]) -> Result<Vec<String>> {
    let mut names = Vec::with_capacity(images.len());
    for image in images {
        let name = format!("{}.{IMAGE_EXTENSION}", Uuid::new_v4());
        encode_webp(image, &dir.join(&name))?;
        names.push(name);
    }

    let meta = PromptMeta {
        prompt: prompt.to_string(),
    };
    fs::write(dir.join(META_FILE), serde_json::to_vec(&meta)?)?;
    Ok(names)
}

/// The WebP encoder only takes 8-bit RGB(A); everything else is converted.
fn encode_webp(image: &DynamicImage, path: &Path) -> Result<()> {
    let result = match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => {
            image.save_with_format(path, ImageFormat::WebP)
        }
        other => DynamicImage::ImageRgba8(other.to_rgba8()).save_with_format(path, ImageFormat::WebP),
    };
    result.map_err(|e| RelayError::Io(std::io::Error::other(format!("encode {}: {e}", path.display()))))
}
