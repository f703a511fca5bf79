//! Content-addressed artifact store.
//!
//! One JSON file per fingerprint, named `<hex>.json`, under a fixed directory.
//! Entries never expire: a bundle is derived purely from its request, so a
//! correctly computed key can never point at stale output.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use fs2::FileExt;

use crate::{
    artifact::ArtifactBundle,
    error::{EngineError, Result},
    fingerprint::Fingerprint,
};

/// Lock file guarding writers, next to the entries.
const LOCK_FILE: &str = ".lock";

/// Disk-backed map from [`Fingerprint`] to [`ArtifactBundle`].
#[derive(Debug, Clone)]
pub struct FingerprintCache {
    dir: PathBuf,
}

impl FingerprintCache {
    /// Open (and create if needed) a cache rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            EngineError::Cache(format!(
                "failed to create cache directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        tracing::debug!(dir = %dir.display(), "Artifact cache opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact file for a fingerprint.
    pub fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.json", fingerprint))
    }

    /// Look up a bundle. A missing or unreadable entry is a miss.
    pub fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ArtifactBundle>> {
        let path = self.entry_path(fingerprint);

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EngineError::Cache(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        match serde_json::from_str(&content) {
            Ok(bundle) => Ok(Some(bundle)),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Ignoring corrupted cache entry, it will be recompiled"
                );
                Ok(None)
            }
        }
    }

    /// Store a bundle, silently replacing any existing entry.
    ///
    /// The entry is written to a temporary file first and renamed into place,
    /// so readers never observe a half-written bundle.
    pub fn put(&self, fingerprint: &Fingerprint, bundle: &ArtifactBundle) -> Result<()> {
        let path = self.entry_path(fingerprint);
        let tmp_path = self
            .dir
            .join(format!(".{}.{}.tmp", fingerprint, std::process::id()));

        let json = serde_json::to_string_pretty(bundle)
            .map_err(|e| EngineError::Cache(format!("failed to serialize bundle: {}", e)))?;

        std::fs::write(&tmp_path, json).map_err(|e| {
            EngineError::Cache(format!("failed to write {}: {}", tmp_path.display(), e))
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|e| {
            EngineError::Cache(format!("failed to move entry to {}: {}", path.display(), e))
        })?;

        tracing::debug!(%fingerprint, path = %path.display(), "Cached artifact bundle");
        Ok(())
    }

    /// Take the cache-wide advisory lock, blocking until it is free.
    ///
    /// Holders compile at most once per fingerprint: take the lock, re-check
    /// the cache, and only then invoke the compiler. A single lock file keeps
    /// the directory at one file per entry.
    pub async fn lock(&self) -> Result<FileLock> {
        let path = self.dir.join(LOCK_FILE);
        tokio::task::spawn_blocking(move || FileLock::acquire(path))
            .await
            .map_err(|e| EngineError::Cache(format!("lock task failed: {}", e)))?
    }
}

/// Exclusive advisory lock on a lock file, released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    pub(crate) fn acquire(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| EngineError::Cache(format!("failed to open {}: {}", path.display(), e)))?;

        file.lock_exclusive()
            .map_err(|e| EngineError::Cache(format!("failed to lock {}: {}", path.display(), e)))?;

        Ok(Self { file, path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release lock");
        }
    }
}
