//! Scratch artifacts: uniquely named files and directories that live for
//! exactly one request.
//!
//! pdfium and Chrome both want file-system paths, so every conversion works
//! through files under a single scratch root. [`ScratchSpace::acquire`] hands
//! out a fresh empty file for a producer to fill; [`ScratchSpace::adopt`]
//! writes an already-received upload for a consumer to read. Either way the
//! caller gets a [`ScratchFile`] guard whose drop deletes the file, so cleanup
//! runs on success, on error, on panic, and when the request future is
//! cancelled.
//!
//! Names are `{prefix}-{uuid}.{ext}` with a v4 UUID, and files are opened with
//! `create_new`, so two concurrent requests can never share a path.

use crate::error::ConvertError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Snapshot of acquisition/release counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchStats {
    pub acquired: u64,
    pub released: u64,
}

impl ScratchStats {
    pub fn outstanding(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

/// Owner of the scratch root. Cheap to clone; clones share counters.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: PathBuf,
    counters: Arc<Counters>,
}

impl ScratchSpace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            counters: Arc::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the scratch root if needed.
    pub async fn ensure_root(&self) -> Result<(), ConvertError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ConvertError::io("creating scratch root", &self.root, e))
    }

    /// Create a new, empty, uniquely named file.
    pub async fn acquire(&self, prefix: &str, ext: &str) -> Result<ScratchFile, ConvertError> {
        self.ensure_root().await?;
        let id = Uuid::new_v4().simple().to_string();
        let path = self.root.join(format!("{prefix}-{id}.{ext}"));

        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| ConvertError::io("creating scratch file", &path, e))?;

        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        debug!("Acquired scratch file {}", path.display());
        Ok(ScratchFile {
            id,
            inner: self.track(path, false),
        })
    }

    /// Create a new, empty, uniquely named directory.
    pub async fn acquire_dir(&self, prefix: &str) -> Result<ScratchDir, ConvertError> {
        self.ensure_root().await?;
        let path = self
            .root
            .join(format!("{prefix}-{}", Uuid::new_v4().simple()));

        tokio::fs::create_dir(&path)
            .await
            .map_err(|e| ConvertError::io("creating scratch directory", &path, e))?;

        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        debug!("Acquired scratch directory {}", path.display());
        Ok(ScratchDir {
            inner: self.track(path, true),
        })
    }

    fn track(&self, path: PathBuf, is_dir: bool) -> Artifact {
        Artifact {
            path,
            is_dir,
            counters: Arc::clone(&self.counters),
            released: false,
        }
    }

    /// Acquire a file and fill it with `bytes`.
    ///
    /// If the write fails the guard is dropped here and the file removed.
    pub async fn adopt(
        &self,
        prefix: &str,
        ext: &str,
        bytes: &[u8],
    ) -> Result<ScratchFile, ConvertError> {
        let file = self.acquire(prefix, ext).await?;
        tokio::fs::write(file.path(), bytes)
            .await
            .map_err(|e| ConvertError::io("writing scratch file", file.path(), e))?;
        Ok(file)
    }

    pub fn stats(&self) -> ScratchStats {
        ScratchStats {
            acquired: self.counters.acquired.load(Ordering::SeqCst),
            released: self.counters.released.load(Ordering::SeqCst),
        }
    }

    /// Delete entries under the root last modified at least `age` ago.
    ///
    /// Returns the number of entries removed. A missing root is not an error.
    pub async fn sweep_older_than(&self, age: Duration) -> Result<usize, ConvertError> {
        let cutoff = SystemTime::now()
            .checked_sub(age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(ConvertError::io("reading scratch root", &self.root, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ConvertError::io("reading scratch root", &self.root, e))?
        {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let stale = meta.modified().map(|m| m <= cutoff).unwrap_or(false);
            if !stale {
                continue;
            }
            let result = if meta.is_dir() {
                tokio::fs::remove_dir_all(entry.path()).await
            } else {
                tokio::fs::remove_file(entry.path()).await
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to sweep {}: {}", entry.path().display(), e),
            }
        }

        if removed > 0 {
            info!("Swept {} stale scratch artifact(s) from {}", removed, self.root.display());
        }
        Ok(removed)
    }
}

/// Deletion bookkeeping shared by file and directory guards.
#[derive(Debug)]
struct Artifact {
    path: PathBuf,
    is_dir: bool,
    counters: Arc<Counters>,
    released: bool,
}

impl Artifact {
    /// Idempotent: the artifact is removed and counted once.
    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let result = if self.is_dir {
            std::fs::remove_dir_all(&self.path)
        } else {
            std::fs::remove_file(&self.path)
        };
        match result {
            Ok(()) => debug!("Released scratch artifact {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove scratch artifact {}: {}", self.path.display(), e),
        }
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        self.remove();
    }
}

/// A scratch file owned by one request. Dropping it deletes the file.
#[derive(Debug)]
pub struct ScratchFile {
    id: String,
    inner: Artifact,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The unique identifier embedded in the file name.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn read(&self) -> Result<Vec<u8>, ConvertError> {
        tokio::fs::read(self.path())
            .await
            .map_err(|e| ConvertError::io("reading scratch file", self.path(), e))
    }

    /// Delete the file now instead of at drop.
    pub fn release(mut self) {
        self.inner.remove();
    }
}

/// A scratch directory owned by one request, removed recursively on drop.
#[derive(Debug)]
pub struct ScratchDir {
    inner: Artifact,
}

impl ScratchDir {
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn release(mut self) {
        self.inner.remove();
    }
}
