//! Cross-process serialization of report lines.
//!
//! The root creates a lock file named after its [`SyncIdentity`]; every
//! process in the tree takes an exclusive `flock(2)` on it around each line
//! it writes to the shared stdout.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Environment variable carrying the root's identity to its children.
pub const SYNC_ENV: &str = "STDERRPROBE_SYNC";
/// Every valid identity starts with this marker.
pub const SYNC_MARKER: &str = "stderrprobe/";

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to create lock file {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open lock file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to acquire lock: {0}")]
    Acquire(#[source] io::Error),

    #[cfg_attr(unix, allow(dead_code))]
    #[error("cross-process lock is not supported on this platform")]
    Unsupported,
}

/// Name shared by a root process and everything it launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncIdentity(String);

impl SyncIdentity {
    /// A new identity for a root process.
    pub fn fresh(pid: u32) -> Self {
        Self(format!("{SYNC_MARKER}{pid}"))
    }

    /// Accept an inherited payload if it carries the marker and a usable name.
    pub fn from_payload(payload: &str) -> Option<Self> {
        let name = payload.strip_prefix(SYNC_MARKER)?;
        let usable = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        usable.then(|| Self(payload.to_string()))
    }

    /// The identity this process inherited, if it was launched by a root.
    pub fn inherited() -> Option<Self> {
        let payload = std::env::var(SYNC_ENV).ok()?;
        let identity = Self::from_payload(&payload);
        if identity.is_none() {
            debug!(%payload, "ignoring malformed sync payload");
        }
        identity
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn lock_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!("{}.lock", self.0.replace('/', "-")))
    }
}

impl fmt::Display for SyncIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open handle on the shared lock file.
///
/// `flock` locks belong to the open file description, so threads of one
/// process do not exclude each other through it; callers pair it with an
/// in-process mutex.
#[derive(Debug)]
pub struct SyncLock {
    file: File,
    path: PathBuf,
    /// `(dev, ino)` of the file this process created; only the creator
    /// removes the path, and only while it still names that file.
    created: Option<(u64, u64)>,
    removed: AtomicBool,
}

impl SyncLock {
    /// Create the lock file for a root identity.
    pub fn create(identity: &SyncIdentity) -> Result<Self, SyncError> {
        let path = identity.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| SyncError::Create {
                path: path.clone(),
                source,
            })?;
        let created = file_identity(&file).map_err(|source| SyncError::Create {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "created sync lock file");
        Ok(Self {
            file,
            path,
            created,
            removed: AtomicBool::new(false),
        })
    }

    /// Open the lock file a root already created.
    pub fn open(identity: &SyncIdentity) -> Result<Self, SyncError> {
        let path = identity.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| SyncError::Open {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            file,
            path,
            created: None,
            removed: AtomicBool::new(false),
        })
    }

    /// Block until this process holds the exclusive lock.
    pub fn acquire(&self) -> Result<SyncGuard<'_>, SyncError> {
        lock_exclusive(&self.file)?;
        Ok(SyncGuard { lock: self })
    }

    /// Remove the lock file if this process created it. Idempotent.
    pub fn remove(&self) {
        let Some(expected) = self.created else {
            return;
        };
        if self.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        let still_ours = std::fs::metadata(&self.path)
            .ok()
            .and_then(|metadata| metadata_identity(&metadata))
            == Some(expected);
        if still_ours {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Held exclusive lock; released on drop.
#[derive(Debug)]
pub struct SyncGuard<'a> {
    lock: &'a SyncLock,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        unlock(&self.lock.file);
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> Result<(), SyncError> {
    use std::os::fd::AsRawFd;

    loop {
        // SAFETY: the descriptor is owned by `file` and stays open for the
        // duration of the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(SyncError::Acquire(err));
        }
    }
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> Result<(), SyncError> {
    Err(SyncError::Unsupported)
}

#[cfg(unix)]
fn unlock(file: &File) {
    use std::os::fd::AsRawFd;

    // SAFETY: as in `lock_exclusive`. Closing the file would release the
    // lock anyway, so a failure here is not actionable.
    let _ = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}

fn file_identity(file: &File) -> io::Result<Option<(u64, u64)>> {
    Ok(metadata_identity(&file.metadata()?))
}

#[cfg(unix)]
fn metadata_identity(metadata: &std::fs::Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;

    Some((metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
fn metadata_identity(_metadata: &std::fs::Metadata) -> Option<(u64, u64)> {
    None
}
