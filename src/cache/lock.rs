//! Advisory per-key sync locks
//!
//! A lock is a JSON sidecar inside the cache directory. It is created with
//! `create_new`, so two processes racing for the same key cannot both
//! succeed. Locks older than the max lock age, locks stamped implausibly far
//! in the future, and sidecars that cannot be parsed are treated as
//! abandoned and reclaimed on the next check.
//!
//! Reclaiming first renames the sidecar aside and compares it with what was
//! observed. Only that same abandoned record is deleted; a lock another
//! process took in the meantime is put back.
//!
//! The lock is advisory: it only excludes other rmirror syncs, not other
//! writers of the cache directory.

use crate::error::{RmirrorError, RmirrorResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Lock sidecar file name
pub const LOCK_FILE: &str = ".rmirror-lock.json";

/// Default maximum lock age before a lock is considered abandoned
pub const DEFAULT_MAX_LOCK_AGE_MINUTES: u32 = 30;

/// How far ahead of the local clock a lock timestamp may be
const CLOCK_SKEW_TOLERANCE_MINUTES: i64 = 5;

/// Ownership record written into the lock sidecar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub sync_id: String,
    pub acquired_at: DateTime<Utc>,
    pub owner_pid: u32,
}

impl LockInfo {
    /// Whether the owning process still exists on this machine
    ///
    /// Only meaningful for locks taken on the same host.
    #[cfg(unix)]
    pub fn owner_alive(&self) -> bool {
        let Ok(pid) = libc::pid_t::try_from(self.owner_pid) else {
            return false;
        };
        // Signal 0 checks existence without delivering anything
        let rc = unsafe { libc::kill(pid, 0) };
        rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(not(unix))]
    pub fn owner_alive(&self) -> bool {
        true
    }
}

/// Why `is_locked` reclaimed a sidecar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reclaim {
    Expired,
    FromFuture,
    Corrupt,
}

/// Acquires, inspects, and releases per-key locks under a cache root
#[derive(Debug, Clone)]
pub struct LockManager {
    root: PathBuf,
    max_age: Duration,
}

impl LockManager {
    pub fn new(root: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            root: root.into(),
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.root.join(key).join(LOCK_FILE)
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.is_locked_at(key, Utc::now())
    }

    /// Check for a valid lock, reclaiming expired or corrupt sidecars
    pub fn is_locked_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        let path = self.lock_path(key);
        let observed = match read_raw(&path) {
            Ok(None) => return false,
            Ok(Some(raw)) => raw,
            Err(e) => {
                warn!("Cannot read lock {}: {}", path.display(), e);
                return true;
            }
        };

        let reclaim = match parse_lock(&observed) {
            Ok(info) if now - info.acquired_at > self.max_age => Reclaim::Expired,
            Ok(info)
                if info.acquired_at - now > Duration::minutes(CLOCK_SKEW_TOLERANCE_MINUTES) =>
            {
                Reclaim::FromFuture
            }
            Ok(_) => return true,
            Err(e) => {
                debug!("Unparseable lock {}: {}", path.display(), e);
                Reclaim::Corrupt
            }
        };

        match reclaim_observed(&path, &observed) {
            Ok(true) => {
                warn!(
                    event = "stale_lock_recovered",
                    key,
                    reason = ?reclaim,
                    "Reclaimed abandoned sync lock"
                );
                false
            }
            Ok(false) => {
                debug!("Lock for {} changed while reclaiming", key);
                self.is_locked_at(key, now)
            }
            Err(e) => {
                warn!("Failed to reclaim stale lock {}: {}", path.display(), e);
                true
            }
        }
    }

    /// Current lock holder, if the sidecar is readable
    pub fn inspect(&self, key: &str) -> Option<LockInfo> {
        read_lock(&self.lock_path(key)).ok().flatten()
    }

    /// Take the lock for `key`
    ///
    /// Call after `is_locked` returned false so abandoned sidecars have been
    /// cleared. The cache directory must already exist.
    pub fn acquire(&self, key: &str, sync_id: &str) -> RmirrorResult<LockGuard> {
        let path = self.lock_path(key);
        let info = LockInfo {
            sync_id: sync_id.to_string(),
            acquired_at: Utc::now(),
            owner_pid: std::process::id(),
        };

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(RmirrorError::LockContention {
                    key: key.to_string(),
                })
            }
            Err(e) => {
                return Err(RmirrorError::io(
                    format!("creating lock {}", path.display()),
                    e,
                ))
            }
        };

        let content = serde_json::to_vec_pretty(&info)?;
        if let Err(e) = file.write_all(&content).and_then(|_| file.sync_all()) {
            // Don't leave an empty sidecar that would read as corrupt
            let _ = fs::remove_file(&path);
            return Err(RmirrorError::io(format!("writing lock {}", path.display()), e));
        }

        debug!("Acquired lock for {} (sync {})", key, sync_id);
        Ok(LockGuard {
            path,
            key: key.to_string(),
            sync_id: sync_id.to_string(),
            released: false,
        })
    }

    /// Delete the lock sidecar; a missing sidecar is not an error
    pub fn release(&self, key: &str) -> RmirrorResult<()> {
        let path = self.lock_path(key);
        remove_if_present(&path)
            .map(|_| ())
            .map_err(|e| RmirrorError::io(format!("removing lock {}", path.display()), e))
    }

    /// Delete the lock regardless of age or owner
    pub fn force_unlock(&self, key: &str) -> RmirrorResult<bool> {
        let path = self.lock_path(key);
        let removed = remove_if_present(&path)
            .map_err(|e| RmirrorError::io(format!("removing lock {}", path.display()), e))?;
        if removed {
            warn!(event = "lock_force_unlocked", key, "Sync lock removed by operator");
        }
        Ok(removed)
    }
}

/// Releases its lock when dropped, on every exit path
///
/// Only deletes the sidecar if it still belongs to this guard's sync, so a
/// guard outliving a force-unlock cannot remove somebody else's lock.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    key: String,
    sync_id: String,
    released: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn sync_id(&self) -> &str {
        &self.sync_id
    }

    /// Release now and report failures to the caller
    pub fn release(mut self) -> RmirrorResult<()> {
        self.released = true;
        self.release_owned()
            .map_err(|e| RmirrorError::io(format!("removing lock {}", self.path.display()), e))
    }

    fn release_owned(&self) -> std::io::Result<()> {
        match read_lock(&self.path) {
            Ok(Some(info)) if info.sync_id != self.sync_id => {
                warn!(
                    "Lock for {} now belongs to sync {}; leaving it in place",
                    self.key, info.sync_id
                );
                Ok(())
            }
            Ok(None) => Ok(()),
            _ => remove_if_present(&self.path).map(|_| ()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.release_owned() {
            warn!("Failed to release lock for {}: {}", self.key, e);
        } else {
            debug!("Released lock for {} on drop", self.key);
        }
    }
}

/// Delete the sidecar at `path` only if it still holds the `observed` bytes
///
/// The sidecar is renamed to a unique name first, so a lock written by a
/// concurrent acquirer after the observation is never deleted. Returns false
/// when the sidecar was gone or had changed; a changed sidecar is restored.
fn reclaim_observed(path: &Path, observed: &[u8]) -> std::io::Result<bool> {
    let aside = path.with_file_name(format!("{}.stale-{}", LOCK_FILE, Uuid::new_v4().simple()));
    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    }

    if fs::read(&aside)? == observed {
        fs::remove_file(&aside)?;
        return Ok(true);
    }

    // Someone else's lock; put it back without clobbering a newer one
    match fs::hard_link(&aside, path) {
        Ok(()) => fs::remove_file(&aside)?,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            warn!(
                "Lock {} was replaced while being restored; dropping {}",
                path.display(),
                aside.display()
            );
            fs::remove_file(&aside)?;
        }
        Err(_) => fs::rename(&aside, path)?,
    }
    Ok(false)
}

/// Raw sidecar bytes, `Ok(None)` when absent
fn read_raw(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn parse_lock(raw: &[u8]) -> std::io::Result<LockInfo> {
    serde_json::from_slice(raw).map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))
}

/// `Ok(None)` when absent, `Err` when present but unreadable or malformed
fn read_lock(path: &Path) -> std::io::Result<Option<LockInfo>> {
    read_raw(path)?.map(|raw| parse_lock(&raw)).transpose()
}

fn remove_if_present(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
