//! Application paths for config and data.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Application paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
    /// Data directory (credential record, prompt list, image cache).
    pub data: PathBuf,
}

impl AppPaths {
    /// Create paths for the imgrelay application.
    #[must_use]
    pub fn new() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("com", "imgrelay", "imgrelay") {
            Self {
                config: proj_dirs.config_dir().to_path_buf(),
                data: proj_dirs.data_dir().to_path_buf(),
            }
        } else {
            // Fallback to home directory
            let home = directories::BaseDirs::new()
                .map_or_else(|| PathBuf::from("."), |d| d.home_dir().to_path_buf());
            Self {
                config: home.join(".config/imgrelay"),
                data: home.join(".local/share/imgrelay"),
            }
        }
    }

    /// Same config dir, data rooted at `data_dir`.
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data: data_dir.into(),
            ..Self::new()
        }
    }

    /// Path to the config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Root of the image cache.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.data.join("images")
    }

    /// Path to the persisted credential record.
    #[must_use]
    pub fn credential_file(&self) -> PathBuf {
        self.data.join("keys.json")
    }

    /// Path to the static auto-prompt list.
    #[must_use]
    pub fn prompts_file(&self) -> PathBuf {
        self.data.join("prompts.json")
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data
    }

    /// Ensure the data directories exist.
    ///
    /// # Errors
    /// Returns an error if a directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data)?;
        std::fs::create_dir_all(self.images_dir())?;
        Ok(())
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_files_live_under_data_dir() {
        let paths = AppPaths::with_data_dir("/srv/imgrelay");
        assert_eq!(paths.images_dir(), PathBuf::from("/srv/imgrelay/images"));
        assert_eq!(paths.credential_file(), PathBuf::from("/srv/imgrelay/keys.json"));
        assert_eq!(paths.prompts_file(), PathBuf::from("/srv/imgrelay/prompts.json"));
    }

    #[test]
    fn config_file_is_toml() {
        let paths = AppPaths::new();
        assert!(paths.config_file().ends_with("config.toml"));
    }

    #[test]
    fn ensure_dirs_creates_images_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = AppPaths::with_data_dir(dir.path().join("data"));
        paths.ensure_dirs().unwrap();
        assert!(paths.images_dir().is_dir());
    }
}
