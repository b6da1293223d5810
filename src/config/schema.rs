//! Configuration schema for rmirror
//!
//! Configuration is stored at `~/.config/rmirror/config.toml`

use crate::bridge::BridgeKind;
use crate::cache::lock::DEFAULT_MAX_LOCK_AGE_MINUTES;
use crate::cache::store::DEFAULT_TTL_HOURS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache location and lifetimes
    pub cache: CacheConfig,

    /// rsync/ssh invocation settings
    pub transfer: TransferConfig,

    /// Execution bridge settings
    pub bridge: BridgeConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable audit logging of sync events
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root directory (default: platform cache dir)
    pub root: Option<PathBuf>,

    /// Hours after a sync before a mirror counts as stale
    pub ttl_hours: u32,

    /// Minutes after which a lock is considered abandoned
    pub max_lock_age_minutes: u32,

    /// Default age threshold for `rmirror cleanup`
    pub cleanup_max_age_hours: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            ttl_hours: DEFAULT_TTL_HOURS,
            max_lock_age_minutes: DEFAULT_MAX_LOCK_AGE_MINUTES,
            cleanup_max_age_hours: DEFAULT_TTL_HOURS,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.ttl_hours))
    }

    pub fn max_lock_age(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.max_lock_age_minutes))
    }
}

/// Transfer tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// rsync executable (inside the bridge)
    pub rsync_path: String,

    /// ssh executable (inside the bridge)
    pub ssh_path: String,

    /// sshpass executable, used only for password auth
    pub sshpass_path: String,

    /// Ceiling for the dry-run estimate
    pub dry_run_timeout_secs: u64,

    /// Ceiling for a real transfer
    pub transfer_timeout_secs: u64,

    /// SSH connect timeout, also the preflight check ceiling
    pub connect_timeout_secs: u64,

    /// Extra arguments appended to every rsync invocation
    pub extra_args: Vec<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            rsync_path: "rsync".to_string(),
            ssh_path: "ssh".to_string(),
            sshpass_path: "sshpass".to_string(),
            dry_run_timeout_secs: 30,
            transfer_timeout_secs: 30 * 60,
            connect_timeout_secs: 15,
            extra_args: vec![],
        }
    }
}

impl TransferConfig {
    pub fn dry_run_timeout(&self) -> Duration {
        Duration::from_secs(self.dry_run_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Execution bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// auto, native, or wsl
    pub kind: BridgeKind,

    /// WSL distribution (default distro when unset)
    pub wsl_distro: Option<String>,

    /// Where drive letters are mounted inside the bridge
    pub mount_prefix: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            kind: BridgeKind::Auto,
            wsl_distro: None,
            mount_prefix: "/mnt".to_string(),
        }
    }
}
