//! On-disk cache directory management
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/<key>/                      mirrored remote content
//! <root>/<key>/.rmirror-synced.json  last successful sync
//! <root>/<key>/.rmirror-lock.json    present while a sync runs
//! ```
//!
//! Status and stats never fail: filesystem errors degrade to zero/unknown
//! values and are logged.

use crate::cache::key::is_cache_key;
use crate::error::{RmirrorError, RmirrorResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Prefix shared by every sidecar file rmirror writes into a cache directory
pub const SIDECAR_PREFIX: &str = ".rmirror-";

/// Sidecar recording the last successful sync
pub const SYNCED_FILE: &str = ".rmirror-synced.json";

/// Default cache TTL
pub const DEFAULT_TTL_HOURS: u32 = 72;

/// Contents of the sync timestamp sidecar
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SyncStamp {
    synced_at: DateTime<Utc>,
}

/// Freshness of a cache entry as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// No directory for this key
    Missing,
    /// Synced within the TTL
    Fresh,
    /// Present but older than the TTL; still usable if the caller opts in
    Expired,
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Fresh => write!(f, "fresh"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Snapshot of one cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub exists: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
    pub size_bytes: u64,
    pub file_count: u64,
}

impl CacheStatus {
    fn missing() -> Self {
        Self {
            exists: false,
            last_synced_at: None,
            is_expired: false,
            size_bytes: 0,
            file_count: 0,
        }
    }

    pub fn state(&self) -> CacheState {
        if !self.exists {
            CacheState::Missing
        } else if self.is_expired {
            CacheState::Expired
        } else {
            CacheState::Fresh
        }
    }
}

/// Owns the cache root and the per-key directories below it
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    ttl: Duration,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Directory holding the mirror for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Ensure the cache directory exists and return it
    pub fn prepare(&self, key: &str) -> RmirrorResult<PathBuf> {
        let path = self.path_for(key);
        fs::create_dir_all(&path)
            .map_err(|e| RmirrorError::io(format!("creating cache dir {}", path.display()), e))?;
        Ok(path)
    }

    pub fn status(&self, key: &str) -> CacheStatus {
        self.status_at(key, Utc::now())
    }

    /// Status evaluated against an explicit clock
    pub fn status_at(&self, key: &str, now: DateTime<Utc>) -> CacheStatus {
        let path = self.path_for(key);
        if !path.is_dir() {
            return CacheStatus::missing();
        }

        let last_synced_at = self.last_synced(key);
        let is_expired = match last_synced_at.or_else(|| dir_mtime(&path)) {
            Some(reference) => now - reference > self.ttl,
            None => true,
        };
        let (size_bytes, file_count) = Self::stats(&path);

        CacheStatus {
            exists: true,
            last_synced_at,
            is_expired,
            size_bytes,
            file_count,
        }
    }

    /// Timestamp of the last successful sync, if one was recorded
    pub fn last_synced(&self, key: &str) -> Option<DateTime<Utc>> {
        let stamp_path = self.path_for(key).join(SYNCED_FILE);
        let content = match fs::read_to_string(&stamp_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read {}: {}", stamp_path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<SyncStamp>(&content) {
            Ok(stamp) => Some(stamp.synced_at),
            Err(e) => {
                warn!("Ignoring malformed sync stamp {}: {}", stamp_path.display(), e);
                None
            }
        }
    }

    /// Age of a cache entry: since last sync, or since directory mtime
    pub fn age_at(&self, key: &str, now: DateTime<Utc>) -> Option<Duration> {
        self.last_synced(key)
            .or_else(|| dir_mtime(&self.path_for(key)))
            .map(|reference| now - reference)
    }

    pub fn mark_synced(&self, key: &str) {
        self.mark_synced_at(key, Utc::now());
    }

    /// Record a successful sync
    ///
    /// Never fails the caller: a missing stamp only degrades the next
    /// status check to "unknown last sync".
    pub fn mark_synced_at(&self, key: &str, at: DateTime<Utc>) {
        let dir = self.path_for(key);
        if let Err(e) = write_stamp(&dir, at) {
            warn!("Failed to record sync time for {}: {}", key, e);
            return;
        }

        // Rsync preserves remote mtimes; bump the directory for people browsing the cache
        match fs::File::open(&dir).and_then(|f| f.set_modified(at.into())) {
            Ok(()) => {}
            Err(e) => debug!("Could not touch {}: {}", dir.display(), e),
        }
    }

    /// Delete the cache directory; returns whether anything was removed
    pub fn remove(&self, key: &str) -> RmirrorResult<bool> {
        let path = self.path_for(key);
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                debug!("Removed cache {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RmirrorError::io(
                format!("removing cache dir {}", path.display()),
                e,
            )),
        }
    }

    /// Recursive size and file count, skipping anything unreadable
    pub fn stats(path: &Path) -> (u64, u64) {
        let mut size = 0u64;
        let mut count = 0u64;

        for entry in WalkDir::new(path).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry under {}: {}", path.display(), e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || is_sidecar(entry.file_name()) {
                continue;
            }

            match entry.metadata() {
                Ok(meta) => {
                    size += meta.len();
                    count += 1;
                }
                Err(e) => debug!("Skipping {}: {}", entry.path().display(), e),
            }
        }

        (size, count)
    }

    /// All cache keys currently present under the root
    pub fn list_keys(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to list cache root {}: {}", self.root.display(), e);
                return Vec::new();
            }
        };

        let mut keys: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| is_cache_key(name))
            .collect();
        keys.sort();
        keys
    }
}

fn is_sidecar(name: &std::ffi::OsStr) -> bool {
    name.to_str()
        .map(|n| n.starts_with(SIDECAR_PREFIX))
        .unwrap_or(false)
}

fn dir_mtime(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

/// Write-then-rename so a crash never leaves a half-written stamp
fn write_stamp(dir: &Path, at: DateTime<Utc>) -> std::io::Result<()> {
    let target = dir.join(SYNCED_FILE);
    let tmp = dir.join(format!("{}.tmp", SYNCED_FILE));
    let content = serde_json::to_string_pretty(&SyncStamp { synced_at: at })
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(&tmp, content)?;
    fs::rename(&tmp, &target)
}
