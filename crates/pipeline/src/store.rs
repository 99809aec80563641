//! Artifact storage with key-scoped locking and atomic publish
//!
//! The cache is modelled as a key-value store shared by any number of
//! processes: `try_get` is a lock-free read, `begin_generate` takes the
//! key's exclusive lock, and `publish` makes a fully written artifact
//! visible in one rename.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use tempfile::Builder;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::key::{Artifact, CacheKey};

/// Proof that the lock for a cache key is held
pub trait HeldLock {
    fn key(&self) -> &CacheKey;
}

/// Storage backend for cached artifacts
pub trait ArtifactStore: Send + Sync {
    type Lock: HeldLock;

    /// Location of a published, non-empty artifact. Never blocks.
    fn try_get(&self, key: &CacheKey, artifact: Artifact) -> Option<PathBuf>;

    /// Take the exclusive lock for `key`, blocking until it is free.
    ///
    /// The lock is released when the returned guard is dropped.
    fn begin_generate(&self, key: &CacheKey) -> Result<Self::Lock>;

    /// Write `artifact` through `write` and publish it atomically.
    ///
    /// Nothing becomes visible if `write` fails.
    fn publish<F>(&self, lock: &Self::Lock, artifact: Artifact, write: F) -> Result<PathBuf>
    where
        F: FnOnce(&mut File) -> idwkit_core::Result<()>;
}

/// Filesystem-backed store rooted at a cache directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `artifact` lives once published
    pub fn path_of(&self, key: &CacheKey, artifact: Artifact) -> PathBuf {
        self.root.join(key.artifact_path(artifact))
    }
}

/// Exclusive OS file lock on a key's lock file
#[derive(Debug)]
pub struct KeyLock {
    key: CacheKey,
    file: File,
}

impl HeldLock for KeyLock {
    fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(key = %self.key, "Failed to release cache lock: {}", e);
        }
        debug!(key = %self.key, "lock released");
    }
}

impl ArtifactStore for FsArtifactStore {
    type Lock = KeyLock;

    fn try_get(&self, key: &CacheKey, artifact: Artifact) -> Option<PathBuf> {
        let path = self.path_of(key, artifact);
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Some(path),
            _ => None,
        }
    }

    fn begin_generate(&self, key: &CacheKey) -> Result<KeyLock> {
        let path = self.root.join(key.lock_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        debug!(key = %key, "waiting for lock");
        file.lock()?;
        debug!(key = %key, "lock acquired");
        Ok(KeyLock { key: *key, file })
    }

    fn publish<F>(&self, lock: &KeyLock, artifact: Artifact, write: F) -> Result<PathBuf>
    where
        F: FnOnce(&mut File) -> idwkit_core::Result<()>,
    {
        let key = lock.key();
        let target = self.path_of(key, artifact);
        let dir = target.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut tmp = Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".tmp")
            .tempfile_in(dir)?;

        write(tmp.as_file_mut()).map_err(|e| PipelineError::from_stage(key, artifact, e))?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| PipelineError::Io(e.error))?;

        debug!(key = %key, artifact = %artifact, path = %target.display(), "published");
        Ok(target)
    }
}
