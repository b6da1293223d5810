//! Transfer execution
//!
//! [`Transfer`] is the seam the sync orchestrator talks to; [`RsyncExecutor`]
//! implements it by running rsync over ssh through an execution bridge.

pub mod command;
pub mod exclude;
pub mod progress;

pub use command::{mirror_destination, RsyncCommand, SourceKind};
pub use exclude::ExclusionRules;

use crate::bridge::{output_with_timeout, spawn_piped, stream_child_output, ExecutionBridge, PathTarget};
use crate::cache::key::SyncOptions;
use crate::config::schema::TransferConfig;
use crate::connection::Connection;
use crate::error::{RmirrorError, RmirrorResult};
use async_trait::async_trait;
use progress::CheckpointTracker;
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One remote path to mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub remote_path: String,
    pub kind: SourceKind,
}

impl TransferJob {
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            remote_path: path.into(),
            kind: SourceKind::Directory,
        }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self {
            remote_path: path.into(),
            kind: SourceKind::File,
        }
    }
}

/// Result of a dry run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DryRunEstimate {
    pub estimated_file_count: u64,
}

impl DryRunEstimate {
    pub fn add(&mut self, other: DryRunEstimate) {
        self.estimated_file_count += other.estimated_file_count;
    }
}

/// Totals for a completed transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    pub files_transferred: u64,
    pub bytes_transferred: u64,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
}

impl TransferStats {
    pub fn add(&mut self, other: TransferStats) {
        self.files_transferred += other.files_transferred;
        self.bytes_transferred += other.bytes_transferred;
        self.duration += other.duration;
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// A progress update from a running transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    pub remote_path: String,
    pub percent: u8,
    pub files_done: u64,
}

/// Callback receiving progress updates
pub type ProgressCallback = Arc<dyn Fn(&TransferProgress) + Send + Sync>;

/// Runs dry runs and transfers for one remote path at a time
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Estimate how many files a transfer would move
    async fn dry_run(
        &self,
        connection: &Connection,
        job: &TransferJob,
        cache_dir: &Path,
        options: &SyncOptions,
    ) -> RmirrorResult<DryRunEstimate>;

    /// Mirror `job` into `cache_dir`
    async fn transfer(
        &self,
        connection: &Connection,
        job: &TransferJob,
        cache_dir: &Path,
        options: &SyncOptions,
        sync_id: &str,
        progress: Option<ProgressCallback>,
    ) -> RmirrorResult<TransferStats>;
}

/// [`Transfer`] implementation running rsync through an execution bridge
pub struct RsyncExecutor {
    bridge: Arc<dyn ExecutionBridge>,
    config: TransferConfig,
}

impl RsyncExecutor {
    pub fn new(bridge: Arc<dyn ExecutionBridge>, config: TransferConfig) -> Self {
        Self { bridge, config }
    }

    /// Create the local destination for `job` and return it in bridge form
    fn prepare_destination(&self, cache_dir: &Path, job: &TransferJob) -> RmirrorResult<(PathBuf, String)> {
        let local = mirror_destination(cache_dir, &job.remote_path, job.kind);
        std::fs::create_dir_all(&local)
            .map_err(|e| RmirrorError::io(format!("creating mirror dir {}", local.display()), e))?;

        let bridged = self
            .bridge
            .translator()
            .translate(&local.to_string_lossy(), PathTarget::Bridge);
        Ok((local, bridged))
    }

    fn command(
        &self,
        connection: &Connection,
        job: &TransferJob,
        destination: String,
        options: &SyncOptions,
    ) -> RsyncCommand {
        let rules = ExclusionRules::from_options(options);
        if !rules.is_empty() {
            debug!(
                path = %job.remote_path,
                patterns = rules.pattern_count(),
                "Applying exclusion rules"
            );
        }
        RsyncCommand::new(&self.config, connection, &job.remote_path, job.kind, destination)
            .recursive(options.recursive)
            .excludes(rules.rsync_args())
    }
}

#[async_trait]
impl Transfer for RsyncExecutor {
    async fn dry_run(
        &self,
        connection: &Connection,
        job: &TransferJob,
        cache_dir: &Path,
        options: &SyncOptions,
    ) -> RmirrorResult<DryRunEstimate> {
        let (_, destination) = self.prepare_destination(cache_dir, job)?;
        let invocation = self
            .command(connection, job, destination, options)
            .dry_run(true)
            .build();
        debug!(command = %invocation, "Running rsync dry run");

        let output = output_with_timeout(
            self.bridge.command(&invocation),
            self.config.dry_run_timeout(),
            "rsync dry run",
        )
        .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RmirrorError::transfer(
                invocation.to_string(),
                stderr.trim().to_string(),
            ));
        }

        let estimate = DryRunEstimate {
            estimated_file_count: progress::parse_dry_run_estimate(&stdout),
        };
        debug!(
            path = %job.remote_path,
            files = estimate.estimated_file_count,
            "Dry run estimate"
        );
        Ok(estimate)
    }

    async fn transfer(
        &self,
        connection: &Connection,
        job: &TransferJob,
        cache_dir: &Path,
        options: &SyncOptions,
        sync_id: &str,
        progress: Option<ProgressCallback>,
    ) -> RmirrorResult<TransferStats> {
        let (local, destination) = self.prepare_destination(cache_dir, job)?;
        let invocation = self.command(connection, job, destination, options).build();
        info!(
            sync_id,
            path = %job.remote_path,
            destination = %local.display(),
            "Starting transfer"
        );
        debug!(command = %invocation, "Running rsync");

        let started = Instant::now();
        let limit = self.config.transfer_timeout();
        let mut child = spawn_piped(self.bridge.command(&invocation), "rsync")?;

        let tracker = Mutex::new(CheckpointTracker::new());
        let files_done = Mutex::new(0u64);
        let on_line = |line: &str| {
            if let Some(count) = progress::parse_xfr_count(line) {
                if let Ok(mut done) = files_done.lock() {
                    *done = count;
                }
            }
            let Some(percent) = progress::parse_percent(line) else {
                return;
            };

            let checkpoint = tracker.lock().ok().and_then(|mut t| t.observe(percent));
            if let Some(checkpoint) = checkpoint {
                info!(sync_id, path = %job.remote_path, percent = checkpoint, "Transfer progress");
            }
            if let Some(ref callback) = progress {
                let files = files_done.lock().map(|d| *d).unwrap_or_default();
                callback(&TransferProgress {
                    remote_path: job.remote_path.clone(),
                    percent,
                    files_done: files,
                });
            }
        };

        let run = async {
            let output = stream_child_output(&mut child, &on_line, &progress::is_stats_line).await?;
            let status = child
                .wait()
                .await
                .map_err(|e| RmirrorError::command_failed("rsync", e))?;
            Ok::<_, RmirrorError>((output, status))
        };
        let result = tokio::time::timeout(limit, run).await;

        let (output, status) = match result {
            Ok(outcome) => outcome?,
            Err(_) => {
                let _ = child.kill().await;
                return Err(RmirrorError::Timeout {
                    operation: format!("rsync transfer of {}", job.remote_path),
                    after: limit,
                });
            }
        };

        if !status.success() {
            return Err(RmirrorError::transfer(invocation.to_string(), output.tail()));
        }

        if job.kind == SourceKind::Directory {
            let rules = ExclusionRules::from_options(options);
            let root = local.clone();
            let pruned = tokio::task::spawn_blocking(move || rules.prune(&root))
                .await
                .map_err(|e| RmirrorError::Internal(format!("prune task failed: {}", e)))??;
            if pruned > 0 {
                info!(sync_id, path = %job.remote_path, pruned, "Removed excluded entries from mirror");
            }
        }

        let (files, bytes) = progress::parse_transfer_totals(output.kept());
        let stats = TransferStats {
            files_transferred: files
                .or_else(|| files_done.lock().ok().map(|d| *d))
                .unwrap_or_default(),
            bytes_transferred: bytes.unwrap_or_default(),
            duration: started.elapsed(),
        };
        info!(
            sync_id,
            path = %job.remote_path,
            files = stats.files_transferred,
            bytes = stats.bytes_transferred,
            "Transfer complete"
        );
        Ok(stats)
    }
}
