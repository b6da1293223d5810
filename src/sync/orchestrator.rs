//! Sync orchestration
//!
//! Ties preflight, locking, transfer, and the cache store together. Every
//! collaborator is injected, so tests drive the full flow with fakes.

use crate::audit::AuditLog;
use crate::bridge::{create_bridge, ExecutionBridge};
use crate::cache::{derive_key, is_cache_key, CacheStore, LockManager};
use crate::config::{Config, ConfigManager};
use crate::connection::{Connection, SyncRequest};
use crate::error::{RmirrorError, RmirrorResult};
use crate::preflight::{EnvironmentInfo, Preflight, SshPreflight};
use crate::sync::state::{CleanupError, CleanupReport, MirrorPath, SyncOutcome, SyncPhase, SyncStatus};
use crate::transfer::{
    mirror_destination, DryRunEstimate, ProgressCallback, RsyncExecutor, Transfer, TransferJob,
    TransferStats,
};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Coordinates syncs, status queries, cleanup, and lock recovery
pub struct SyncOrchestrator {
    store: CacheStore,
    locks: LockManager,
    preflight: Box<dyn Preflight>,
    transfer: Box<dyn Transfer>,
    audit: AuditLog,
    progress: Option<ProgressCallback>,
}

impl SyncOrchestrator {
    pub fn new(
        store: CacheStore,
        locks: LockManager,
        preflight: Box<dyn Preflight>,
        transfer: Box<dyn Transfer>,
        audit: AuditLog,
    ) -> Self {
        Self {
            store,
            locks,
            preflight,
            transfer,
            audit,
            progress: None,
        }
    }

    /// Wire up the real bridge, ssh preflight, and rsync executor
    pub fn from_config(config: &Config) -> Self {
        let bridge: Arc<dyn ExecutionBridge> = Arc::from(create_bridge(&config.bridge));
        let root = ConfigManager::cache_root(config);

        Self::new(
            CacheStore::new(root.clone(), config.cache.ttl()),
            LockManager::new(root, config.cache.max_lock_age()),
            Box::new(SshPreflight::new(Arc::clone(&bridge), config.transfer.clone())),
            Box::new(RsyncExecutor::new(bridge, config.transfer.clone())),
            AuditLog::new(config),
        )
    }

    /// Receive progress updates from running transfers
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn cache_key(request: &SyncRequest) -> String {
        derive_key(&request.connection, &request.paths, &request.options)
    }

    /// Run every preflight check for a request without touching the cache
    pub async fn preflight(&self, request: &SyncRequest) -> RmirrorResult<EnvironmentInfo> {
        validate_request(request)?;
        let connection = &request.connection;

        let env = self
            .preflight
            .check_environment(connection.uses_password())
            .await?;

        if !self.preflight.test_connection(connection).await? {
            return Err(RmirrorError::HostUnreachable {
                host: connection.host.clone(),
                reason: "connection test failed".to_string(),
            });
        }

        let (dirs, files) = request.paths.normalized();
        for path in dirs.iter().chain(files.iter()) {
            if !self.preflight.check_remote_path(connection, path).await? {
                return Err(RmirrorError::RemotePathMissing { path: path.clone() });
            }
        }

        Ok(env)
    }

    /// Mirror the requested remote paths into their cache directory
    pub async fn sync(&self, request: &SyncRequest) -> RmirrorResult<SyncOutcome> {
        let sync_id = Uuid::new_v4().to_string();
        let key = Self::cache_key(request);
        let connection = &request.connection;

        info!(
            phase = %SyncPhase::Preflight,
            sync_id = %sync_id,
            key = %key,
            target = %connection,
            "Starting sync"
        );
        if let Err(e) = self.preflight(request).await {
            self.record_failure(SyncPhase::Preflight, connection, &key, &sync_id, &e)
                .await;
            return Err(e);
        }

        match self.sync_locked(request, &key, &sync_id).await {
            Ok(outcome) => {
                info!(
                    phase = %SyncPhase::Done,
                    sync_id = %sync_id,
                    key = %key,
                    files = outcome.stats.files_transferred,
                    bytes = outcome.stats.bytes_transferred,
                    "Sync complete"
                );
                self.audit
                    .log_sync(
                        "sync.completed",
                        connection,
                        &key,
                        serde_json::json!({
                            "sync_id": sync_id,
                            "files_transferred": outcome.stats.files_transferred,
                            "bytes_transferred": outcome.stats.bytes_transferred,
                        }),
                    )
                    .await;
                Ok(outcome)
            }
            Err((phase, e)) => {
                self.record_failure(phase, connection, &key, &sync_id, &e).await;
                Err(e)
            }
        }
    }

    /// Everything from lock acquisition to the sync stamp
    ///
    /// The lock guard is released explicitly on the normal path and by its
    /// `Drop` on every other one.
    async fn sync_locked(
        &self,
        request: &SyncRequest,
        key: &str,
        sync_id: &str,
    ) -> Result<SyncOutcome, (SyncPhase, RmirrorError)> {
        debug!(phase = %SyncPhase::LockWait, sync_id, key, "Checking lock");
        let cache_path = self.store.prepare(key).map_err(failed_in(SyncPhase::LockWait))?;
        if self.locks.is_locked(key) {
            return Err((
                SyncPhase::LockWait,
                RmirrorError::LockContention {
                    key: key.to_string(),
                },
            ));
        }
        let guard = self
            .locks
            .acquire(key, sync_id)
            .map_err(failed_in(SyncPhase::LockWait))?;

        self.audit
            .log_sync(
                "sync.started",
                &request.connection,
                key,
                serde_json::json!({ "sync_id": sync_id }),
            )
            .await;

        let result = self.run_transfers(request, key, sync_id, &cache_path).await;
        if result.is_ok() {
            self.store.mark_synced(key);
        }

        if let Err(e) = guard.release() {
            warn!(sync_id, key, "Failed to release sync lock: {}", e);
        }

        let (dry_run, stats, mirrors) = result?;

        Ok(SyncOutcome {
            cache_key: key.to_string(),
            cache_path,
            sync_id: sync_id.to_string(),
            dry_run,
            stats,
            mirrors,
        })
    }

    async fn run_transfers(
        &self,
        request: &SyncRequest,
        key: &str,
        sync_id: &str,
        cache_path: &Path,
    ) -> Result<(DryRunEstimate, TransferStats, Vec<MirrorPath>), (SyncPhase, RmirrorError)> {
        let (dirs, files) = request.paths.normalized();
        let jobs: Vec<TransferJob> = dirs
            .into_iter()
            .map(TransferJob::directory)
            .chain(files.into_iter().map(TransferJob::file))
            .collect();
        let connection = &request.connection;
        let options = &request.options;

        let mut estimate = DryRunEstimate::default();
        for job in &jobs {
            let job_estimate = self
                .transfer
                .dry_run(connection, job, cache_path, options)
                .await
                .map_err(failed_in(SyncPhase::DryRun))?;
            estimate.add(job_estimate);
        }
        info!(
            phase = %SyncPhase::DryRun,
            sync_id,
            key,
            estimated_files = estimate.estimated_file_count,
            "Dry run complete"
        );

        let mut stats = TransferStats::default();
        let mut mirrors = Vec::with_capacity(jobs.len());
        for job in &jobs {
            info!(phase = %SyncPhase::Transferring, sync_id, key, path = %job.remote_path, "Transferring");
            let job_stats = self
                .transfer
                .transfer(connection, job, cache_path, options, sync_id, self.progress.clone())
                .await
                .map_err(failed_in(SyncPhase::Transferring))?;
            stats.add(job_stats);
            mirrors.push(MirrorPath {
                remote: job.remote_path.clone(),
                kind: job.kind,
                local: mirror_destination(cache_path, &job.remote_path, job.kind),
            });
        }

        Ok((estimate, stats, mirrors))
    }

    async fn record_failure(
        &self,
        phase: SyncPhase,
        connection: &Connection,
        key: &str,
        sync_id: &str,
        error: &RmirrorError,
    ) {
        warn!(
            phase = %SyncPhase::Failed,
            failed_in = %phase,
            sync_id,
            key,
            "Sync failed: {}",
            error
        );
        self.audit
            .log_sync(
                "sync.failed",
                connection,
                key,
                serde_json::json!({
                    "sync_id": sync_id,
                    "phase": phase.to_string(),
                    "error": error.to_string(),
                }),
            )
            .await;
    }

    /// Status of the cache entry a request maps to
    pub async fn status(&self, request: &SyncRequest) -> RmirrorResult<SyncStatus> {
        self.status_for_key(&Self::cache_key(request)).await
    }

    /// Status of a cache entry by key
    pub async fn status_for_key(&self, key: &str) -> RmirrorResult<SyncStatus> {
        ensure_key(key)?;
        let locked = self.locks.is_locked(key);
        let lock = if locked { self.locks.inspect(key) } else { None };

        let store = self.store.clone();
        let owned_key = key.to_string();
        let cache = blocking(move || store.status(&owned_key)).await?;

        let mut status = SyncStatus::new(key.to_string(), self.store.path_for(key), cache, lock);
        status.locked = locked;
        Ok(status)
    }

    /// Status of every cache entry under the root
    pub async fn list(&self) -> RmirrorResult<Vec<SyncStatus>> {
        let mut entries = Vec::new();
        for key in self.store.list_keys() {
            entries.push(self.status_for_key(&key).await?);
        }
        Ok(entries)
    }

    /// Remove unlocked caches not synced within `max_age_hours`
    ///
    /// `0` removes every unlocked cache.
    pub async fn cleanup(&self, max_age_hours: u32) -> CleanupReport {
        self.cleanup_at(Duration::hours(i64::from(max_age_hours)), Utc::now())
            .await
    }

    /// Cleanup evaluated against an explicit clock
    pub async fn cleanup_at(&self, max_age: Duration, now: DateTime<Utc>) -> CleanupReport {
        let mut report = CleanupReport::default();

        for key in self.store.list_keys() {
            report.total_count += 1;

            let old_enough = match self.store.age_at(&key, now) {
                Some(age) => max_age <= Duration::zero() || age > max_age,
                None => true,
            };
            if !old_enough {
                continue;
            }

            if self.locks.is_locked_at(&key, now) {
                info!(key = %key, "Skipping locked cache");
                report.skipped_locked.push(key);
                continue;
            }

            // Hold the lock while deleting so a sync cannot start underneath us
            let cleanup_id = format!("cleanup-{}", Uuid::new_v4());
            let guard = match self.locks.acquire(&key, &cleanup_id) {
                Ok(guard) => guard,
                Err(RmirrorError::LockContention { .. }) => {
                    report.skipped_locked.push(key);
                    continue;
                }
                Err(e) => {
                    report.errors.push(CleanupError {
                        cache_key: key,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let path = self.store.path_for(&key);
            let size = blocking(move || CacheStore::stats(&path).0)
                .await
                .unwrap_or_default();

            match self.store.remove(&key) {
                Ok(removed) => {
                    drop(guard);
                    if removed {
                        info!(key = %key, bytes = size, "Removed cache");
                        self.audit
                            .log(
                                "cache.removed",
                                &serde_json::json!({ "cache_key": key, "size_bytes": size }),
                            )
                            .await;
                        report.total_size_reclaimed += size;
                        report.removed.push(key);
                    }
                }
                Err(e) => {
                    drop(guard);
                    warn!(key = %key, "Failed to remove cache: {}", e);
                    report.errors.push(CleanupError {
                        cache_key: key,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Remove the lock for the cache entry a request maps to
    pub async fn force_unlock(&self, request: &SyncRequest) -> RmirrorResult<bool> {
        self.force_unlock_key(&Self::cache_key(request)).await
    }

    /// Remove the lock for a cache key regardless of age or owner
    pub async fn force_unlock_key(&self, key: &str) -> RmirrorResult<bool> {
        ensure_key(key)?;
        let holder = self.locks.inspect(key);
        let unlocked = self.locks.force_unlock(key)?;
        if unlocked {
            self.audit
                .log(
                    "lock.force_unlocked",
                    &serde_json::json!({
                        "cache_key": key,
                        "sync_id": holder.map(|h| h.sync_id),
                    }),
                )
                .await;
        }
        Ok(unlocked)
    }
}

fn failed_in(phase: SyncPhase) -> impl Fn(RmirrorError) -> (SyncPhase, RmirrorError) {
    move |e| (phase, e)
}

fn validate_request(request: &SyncRequest) -> RmirrorResult<()> {
    request
        .connection
        .validate()
        .map_err(RmirrorError::InvalidRequest)?;
    if request.paths.is_empty() {
        return Err(RmirrorError::InvalidRequest(
            "at least one remote directory or file is required".to_string(),
        ));
    }
    Ok(())
}

/// Keys name directories under the cache root; reject anything else
fn ensure_key(key: &str) -> RmirrorResult<()> {
    if is_cache_key(key) {
        Ok(())
    } else {
        Err(RmirrorError::InvalidRequest(format!(
            "'{}' is not a cache key (expected 16 lowercase hex characters)",
            key
        )))
    }
}

/// Run filesystem-heavy work off the async runtime
async fn blocking<T, F>(f: F) -> RmirrorResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RmirrorError::Internal(format!("blocking task failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::SyncOptions;
    use crate::cache::lock::LOCK_FILE;
    use crate::cache::LockInfo;
    use crate::connection::RemotePaths;
    use crate::error::ErrorClass;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakePreflight {
        auth_fails: bool,
        missing: Vec<String>,
    }

    #[async_trait]
    impl Preflight for FakePreflight {
        async fn check_environment(&self, _needs_password: bool) -> RmirrorResult<EnvironmentInfo> {
            Ok(EnvironmentInfo {
                bridge: "fake".to_string(),
                available: true,
                bridge_version: None,
                tools: vec![],
            })
        }

        async fn test_connection(&self, connection: &Connection) -> RmirrorResult<bool> {
            if self.auth_fails {
                return Err(RmirrorError::AuthFailed {
                    target: connection.masked(),
                });
            }
            Ok(true)
        }

        async fn check_remote_path(&self, _connection: &Connection, path: &str) -> RmirrorResult<bool> {
            Ok(!self.missing.iter().any(|m| m == path))
        }
    }

    /// Writes one file per job and records whether the lock was held
    #[derive(Default)]
    struct FakeTransfer {
        fail_dry_run: bool,
        fail_transfer: bool,
        saw_lock: Arc<AtomicBool>,
        transfers: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transfer for FakeTransfer {
        async fn dry_run(
            &self,
            _connection: &Connection,
            _job: &TransferJob,
            _cache_dir: &Path,
            _options: &SyncOptions,
        ) -> RmirrorResult<DryRunEstimate> {
            if self.fail_dry_run {
                return Err(RmirrorError::transfer("rsync --dry-run", "connection closed"));
            }
            Ok(DryRunEstimate {
                estimated_file_count: 1,
            })
        }

        async fn transfer(
            &self,
            _connection: &Connection,
            job: &TransferJob,
            cache_dir: &Path,
            _options: &SyncOptions,
            _sync_id: &str,
            progress: Option<ProgressCallback>,
        ) -> RmirrorResult<TransferStats> {
            self.transfers.fetch_add(1, Ordering::SeqCst);
            if cache_dir.join(LOCK_FILE).exists() {
                self.saw_lock.store(true, Ordering::SeqCst);
            }
            if self.fail_transfer {
                return Err(RmirrorError::transfer("rsync", "rsync error: some files vanished"));
            }

            let dest = mirror_destination(cache_dir, &job.remote_path, job.kind);
            std::fs::create_dir_all(&dest).unwrap();
            let name = match job.kind {
                crate::transfer::SourceKind::Directory => "data.txt".to_string(),
                crate::transfer::SourceKind::File => {
                    job.remote_path.rsplit('/').next().unwrap().to_string()
                }
            };
            std::fs::write(dest.join(name), b"hello").unwrap();

            if let Some(callback) = progress {
                callback(&crate::transfer::TransferProgress {
                    remote_path: job.remote_path.clone(),
                    percent: 100,
                    files_done: 1,
                });
            }

            Ok(TransferStats {
                files_transferred: 1,
                bytes_transferred: 5,
                duration: std::time::Duration::from_millis(1),
            })
        }
    }

    fn orchestrator(temp: &TempDir, preflight: FakePreflight, transfer: FakeTransfer) -> SyncOrchestrator {
        let root = temp.path().join("cache");
        SyncOrchestrator::new(
            CacheStore::new(root.clone(), Duration::hours(72)),
            LockManager::new(root, Duration::minutes(30)),
            Box::new(preflight),
            Box::new(transfer),
            AuditLog::with_path(temp.path().join("audit.log")),
        )
    }

    fn request() -> SyncRequest {
        SyncRequest::new(
            Connection::new("build.example.com", "dev"),
            RemotePaths::multi(vec!["/srv/app".to_string()], vec!["/etc/app.conf".to_string()]),
            SyncOptions::default(),
        )
    }

    fn write_lock(root: &Path, key: &str, acquired_at: DateTime<Utc>) {
        let dir = root.join(key);
        std::fs::create_dir_all(&dir).unwrap();
        let info = LockInfo {
            sync_id: "stuck-sync".to_string(),
            acquired_at,
            owner_pid: 1,
        };
        std::fs::write(dir.join(LOCK_FILE), serde_json::to_vec(&info).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn fresh_sync_populates_cache() {
        let temp = TempDir::new().unwrap();
        let transfer = FakeTransfer::default();
        let saw_lock = Arc::clone(&transfer.saw_lock);
        let progress_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&progress_calls);
        let orch = orchestrator(&temp, FakePreflight::default(), transfer).with_progress(Arc::new(
            move |_p: &crate::transfer::TransferProgress| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));

        let outcome = orch.sync(&request()).await.unwrap();

        assert_eq!(outcome.cache_key.len(), 16);
        assert_eq!(outcome.dry_run.estimated_file_count, 2);
        assert_eq!(outcome.stats.files_transferred, 2);
        assert_eq!(outcome.mirrors.len(), 2);
        assert!(outcome.cache_path.join("srv/app/data.txt").is_file());
        assert!(outcome.cache_path.join("etc/app.conf").is_file());
        assert!(saw_lock.load(Ordering::SeqCst));
        assert_eq!(progress_calls.load(Ordering::SeqCst), 2);

        let status = orch.status(&request()).await.unwrap();
        assert!(status.exists);
        assert!(!status.locked);
        assert!(!status.is_expired);
        assert!(status.last_synced_at.is_some());
        assert_eq!(status.file_count, 2);
        assert_eq!(status.size_bytes, 10);

        let audit = std::fs::read_to_string(temp.path().join("audit.log")).unwrap();
        assert!(audit.contains("sync.started"));
        assert!(audit.contains("sync.completed"));
    }

    #[tokio::test]
    async fn transfer_failure_releases_lock() {
        let temp = TempDir::new().unwrap();
        let transfer = FakeTransfer {
            fail_transfer: true,
            ..FakeTransfer::default()
        };
        let orch = orchestrator(&temp, FakePreflight::default(), transfer);

        let err = orch.sync(&request()).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Operational);

        let status = orch.status(&request()).await.unwrap();
        assert!(!status.locked);
        assert!(status.last_synced_at.is_none());
        assert!(!orch.store().path_for(&status.cache_key).join(LOCK_FILE).exists());

        // A retry is not blocked by the failed attempt
        let retry = orchestrator(&temp, FakePreflight::default(), FakeTransfer::default());
        assert!(retry.sync(&request()).await.is_ok());
    }

    #[tokio::test]
    async fn dry_run_failure_releases_lock_without_transfer() {
        let temp = TempDir::new().unwrap();
        let transfer = FakeTransfer {
            fail_dry_run: true,
            ..FakeTransfer::default()
        };
        let transfers = Arc::clone(&transfer.transfers);
        let orch = orchestrator(&temp, FakePreflight::default(), transfer);

        assert!(orch.sync(&request()).await.is_err());
        assert_eq!(transfers.load(Ordering::SeqCst), 0);
        assert!(!orch.status(&request()).await.unwrap().locked);
    }

    #[tokio::test]
    async fn preflight_failure_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let preflight = FakePreflight {
            auth_fails: true,
            ..FakePreflight::default()
        };
        let orch = orchestrator(&temp, preflight, FakeTransfer::default());

        let err = orch.sync(&request()).await.unwrap_err();
        assert!(matches!(err, RmirrorError::AuthFailed { .. }));
        assert_eq!(err.class(), ErrorClass::Preflight);
        assert!(!temp.path().join("cache").exists());

        let audit = std::fs::read_to_string(temp.path().join("audit.log")).unwrap();
        assert!(audit.contains("sync.failed"));
    }

    #[tokio::test]
    async fn missing_remote_path_is_reported() {
        let temp = TempDir::new().unwrap();
        let preflight = FakePreflight {
            missing: vec!["/etc/app.conf".to_string()],
            ..FakePreflight::default()
        };
        let orch = orchestrator(&temp, preflight, FakeTransfer::default());

        let err = orch.sync(&request()).await.unwrap_err();
        assert!(matches!(err, RmirrorError::RemotePathMissing { ref path } if path == "/etc/app.conf"));
        assert!(!temp.path().join("cache").exists());
    }

    #[tokio::test]
    async fn concurrent_sync_is_rejected() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp, FakePreflight::default(), FakeTransfer::default());
        let key = SyncOrchestrator::cache_key(&request());

        let locks = LockManager::new(temp.path().join("cache"), Duration::minutes(30));
        orch.store().prepare(&key).unwrap();
        let guard = locks.acquire(&key, "other-sync").unwrap();

        let err = orch.sync(&request()).await.unwrap_err();
        assert!(matches!(err, RmirrorError::LockContention { .. }));
        assert_eq!(err.class(), ErrorClass::Contention);
        // The other sync still owns its lock
        assert_eq!(locks.inspect(&key).unwrap().sync_id, "other-sync");

        drop(guard);
        assert!(orch.sync(&request()).await.is_ok());
    }

    #[tokio::test]
    async fn stuck_lock_is_recovered() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp, FakePreflight::default(), FakeTransfer::default());
        let key = SyncOrchestrator::cache_key(&request());
        write_lock(
            &temp.path().join("cache"),
            &key,
            Utc::now() - Duration::minutes(40),
        );

        let outcome = orch.sync(&request()).await.unwrap();
        assert_eq!(outcome.cache_key, key);
        assert!(!orch.status(&request()).await.unwrap().locked);
    }

    #[tokio::test]
    async fn force_unlock_clears_fresh_lock() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp, FakePreflight::default(), FakeTransfer::default());
        let key = SyncOrchestrator::cache_key(&request());
        write_lock(&temp.path().join("cache"), &key, Utc::now());

        let status = orch.status(&request()).await.unwrap();
        assert!(status.locked);
        assert_eq!(status.lock.unwrap().sync_id, "stuck-sync");

        assert!(orch.force_unlock(&request()).await.unwrap());
        assert!(!orch.status(&request()).await.unwrap().locked);
        assert!(!orch.force_unlock_key(&key).await.unwrap());
        assert!(orch.sync(&request()).await.is_ok());

        let audit = std::fs::read_to_string(temp.path().join("audit.log")).unwrap();
        assert!(audit.contains("lock.force_unlocked"));
    }

    #[tokio::test]
    async fn force_unlock_rejects_non_keys() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp, FakePreflight::default(), FakeTransfer::default());
        let err = orch.force_unlock_key("../etc").await.unwrap_err();
        assert!(matches!(err, RmirrorError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn cleanup_skips_locked_keys() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp, FakePreflight::default(), FakeTransfer::default());
        let now = Utc::now();
        let old = now - Duration::hours(10);

        let idle = "00000000000000aa";
        let busy = "00000000000000bb";
        let recent = "00000000000000cc";
        for key in [idle, busy, recent] {
            let dir = orch.store().prepare(key).unwrap();
            std::fs::write(dir.join("f.bin"), vec![0u8; 100]).unwrap();
        }
        orch.store().mark_synced_at(idle, old);
        orch.store().mark_synced_at(busy, old);
        orch.store().mark_synced_at(recent, now);
        write_lock(&temp.path().join("cache"), busy, now);

        let report = orch.cleanup_at(Duration::hours(1), now).await;

        assert_eq!(report.removed, vec![idle.to_string()]);
        assert_eq!(report.skipped_locked, vec![busy.to_string()]);
        assert!(report.errors.is_empty());
        assert_eq!(report.total_size_reclaimed, 100);
        assert_eq!(report.total_count, 3);
        assert!(!orch.store().path_for(idle).exists());
        assert!(orch.store().path_for(busy).exists());
        assert!(orch.store().path_for(recent).exists());
    }

    #[tokio::test]
    async fn cleanup_zero_removes_every_unlocked_cache() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp, FakePreflight::default(), FakeTransfer::default());
        orch.sync(&request()).await.unwrap();

        let report = orch.cleanup(0).await;
        assert_eq!(report.removed.len(), 1);
        assert!(orch.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_request_rejected_before_preflight() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp, FakePreflight::default(), FakeTransfer::default());
        let req = SyncRequest::new(
            Connection::new("box", "dev"),
            RemotePaths::multi(vec![], vec![]),
            SyncOptions::default(),
        );
        let err = orch.sync(&req).await.unwrap_err();
        assert!(matches!(err, RmirrorError::InvalidRequest(_)));
    }
}
