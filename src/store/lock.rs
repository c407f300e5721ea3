//! Exclusive pass lock next to a mapping store.
//!
//! A pass holds `<store>.lock` from load to save. The file is created with
//! `create_new`, so a second process fails fast instead of interleaving
//! whole-file writes. Locks left behind by a killed process are reclaimed
//! once they are older than the configured staleness window.

use crate::error::{Result, SyncError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Held for the duration of one pass; released on drop.
#[derive(Debug)]
pub struct PassLock {
    path: PathBuf,
}

impl PassLock {
    /// Lock path for a store file.
    #[must_use]
    pub fn path_for(store_path: &Path) -> PathBuf {
        let mut name = store_path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        store_path.with_file_name(name)
    }

    /// Acquire the lock for `store_path`.
    ///
    /// # Errors
    ///
    /// Returns `StoreLocked` if a fresh lock exists, or an I/O error if
    /// the lock file cannot be created.
    pub fn acquire(store_path: &Path, stale_after: Duration) -> Result<Self> {
        let path = Self::path_for(store_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        match Self::try_create(&path) {
            Ok(lock) => Ok(lock),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                if !Self::is_stale(&path, stale_after) {
                    return Err(SyncError::StoreLocked { path });
                }
                warn!(path = %path.display(), "Reclaiming stale pass lock");
                fs::remove_file(&path)?;
                Self::try_create(&path).map_err(|err| {
                    if err.kind() == ErrorKind::AlreadyExists {
                        SyncError::StoreLocked { path: path.clone() }
                    } else {
                        SyncError::Io(err)
                    }
                })
            }
            Err(err) => Err(SyncError::Io(err)),
        }
    }

    fn try_create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let json = serde_json::to_string(&info).map_err(std::io::Error::other)?;
        file.write_all(json.as_bytes())?;
        debug!(path = %path.display(), pid = info.pid, "Acquired pass lock");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn is_stale(path: &Path, stale_after: Duration) -> bool {
        let acquired_at = fs::read_to_string(path)
            .ok()
            .and_then(|contents| serde_json::from_str::<LockInfo>(&contents).ok())
            .map(|info| info.acquired_at)
            .or_else(|| {
                fs::metadata(path)
                    .and_then(|meta| meta.modified())
                    .ok()
                    .map(DateTime::<Utc>::from)
            });

        acquired_at.is_none_or(|at| Utc::now() - at > stale_after)
    }
}

impl Drop for PassLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "Failed to release pass lock");
        }
    }
}
