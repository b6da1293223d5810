//! Result types returned by the sync orchestrator

use crate::cache::{CacheState, CacheStatus, LockInfo};
use crate::transfer::{DryRunEstimate, SourceKind, TransferStats};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Lifecycle of one sync, recorded as the `phase` field of log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Preflight,
    LockWait,
    DryRun,
    Transferring,
    Done,
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preflight => "preflight",
            Self::LockWait => "lock_wait",
            Self::DryRun => "dry_run",
            Self::Transferring => "transferring",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Where one remote path landed inside the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorPath {
    pub remote: String,
    pub kind: SourceKind,
    pub local: PathBuf,
}

/// Result of a successful sync
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub cache_key: String,
    pub cache_path: PathBuf,
    pub sync_id: String,
    pub dry_run: DryRunEstimate,
    pub stats: TransferStats,
    pub mirrors: Vec<MirrorPath>,
}

/// Status of one cache entry, including its lock
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub cache_key: String,
    pub cache_path: PathBuf,
    pub state: CacheState,
    pub exists: bool,
    pub locked: bool,
    pub lock: Option<LockInfo>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
    pub size_bytes: u64,
    pub file_count: u64,
}

impl SyncStatus {
    pub fn new(
        cache_key: String,
        cache_path: PathBuf,
        cache: CacheStatus,
        lock: Option<LockInfo>,
    ) -> Self {
        Self {
            cache_key,
            cache_path,
            state: cache.state(),
            exists: cache.exists,
            locked: lock.is_some(),
            lock,
            last_synced_at: cache.last_synced_at,
            is_expired: cache.is_expired,
            size_bytes: cache.size_bytes,
            file_count: cache.file_count,
        }
    }
}

/// A cache entry cleanup could not remove
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupError {
    pub cache_key: String,
    pub error: String,
}

/// Result of a cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Keys whose directories were deleted
    pub removed: Vec<String>,
    /// Old enough to remove but held by a valid lock
    pub skipped_locked: Vec<String>,
    pub errors: Vec<CleanupError>,
    /// Bytes freed by the removed entries
    pub total_size_reclaimed: u64,
    /// Cache entries examined
    pub total_count: u64,
}
