//! Persistent store for the single live API credential.
//!
//! The record is a small JSON file. Rotations write a temp file next to it,
//! fsync, and rename over the record before the in-memory copy is replaced,
//! so readers only ever see the old or the new credential and a failed write
//! leaves the old token authoritative. A rotation runs to completion on the
//! blocking pool even if the caller stops waiting for it.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::core::models::Credential;
use crate::error::{RelayError, Result};

/// Owns the live credential and its on-disk record.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    live: Arc<RwLock<Credential>>,
    /// Serializes rotations so two renewals cannot interleave their writes.
    rotation: Arc<Mutex<()>>,
}

impl CredentialStore {
    /// Open the store at `path`.
    ///
    /// When no record exists yet the store starts from `seed_token` (or an
    /// empty token, which the API will reject and thereby trigger a renewal).
    /// Nothing is written until the first rotation.
    ///
    /// # Errors
    /// Returns an error if the record exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>, seed_token: Option<String>) -> Result<Self> {
        let path = path.into();
        let credential = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let credential: Credential = serde_json::from_str(&content)?;
            tracing::debug!(
                path = %path.display(),
                rotation_count = credential.rotation_count,
                fingerprint = %credential.fingerprint(),
                "Loaded credential record"
            );
            credential
        } else {
            tracing::debug!(path = %path.display(), "No credential record, using seed token");
            Credential::new(seed_token.unwrap_or_default())
        };

        Ok(Self::with_credential(path, credential))
    }

    /// Build a store around an explicit credential (no disk read).
    #[must_use]
    pub fn with_credential(path: impl Into<PathBuf>, credential: Credential) -> Self {
        Self {
            path: path.into(),
            live: Arc::new(RwLock::new(credential)),
            rotation: Arc::new(Mutex::new(())),
        }
    }

    /// Path of the persisted record.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the live credential.
    #[must_use]
    pub fn current(&self) -> Credential {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the live credential with `new_token`.
    ///
    /// Records the rotation time and bumps `rotation_count`. The record is
    /// persisted first; memory is only updated after the write succeeds.
    ///
    /// # Errors
    /// Returns [`RelayError::Persistence`] if the record cannot be written.
    pub async fn rotate(&self, new_token: &str) -> Result<Credential> {
        let live = Arc::clone(&self.live);
        let rotation = Arc::clone(&self.rotation);
        let path = self.path.clone();
        let token = new_token.to_string();

        let next =
            tokio::task::spawn_blocking(move || commit_rotation(&rotation, &live, &path, &token))
                .await
                .map_err(|e| {
                    RelayError::Other(anyhow::anyhow!("credential writer panicked: {e}"))
                })??;

        tracing::info!(
            rotation_count = next.rotation_count,
            fingerprint = %next.fingerprint(),
            "Credential rotated"
        );
        Ok(next)
    }
}

/// Persist the next credential, then publish it to memory.
fn commit_rotation(
    rotation: &Mutex<()>,
    live: &RwLock<Credential>,
    path: &Path,
    token: &str,
) -> Result<Credential> {
    let _guard = rotation.lock().unwrap_or_else(PoisonError::into_inner);

    let next = live
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .rotated(token);
    write_record(path, &next).map_err(|e| RelayError::Persistence {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    *live.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
    Ok(next)
}

/// Write the record via temp file + rename.
fn write_record(path: &Path, credential: &Credential) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_vec_pretty(credential).map_err(std::io::Error::other)?;

    let parent = path.parent().unwrap_or(Path::new("."));
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("keys"),
        std::process::id()
    ));

    {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(&content)?;
        file.sync_all()?;
    }

    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}
