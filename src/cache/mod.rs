//! Local mirror cache
//!
//! One directory per cache key under a shared root. Keys are derived from
//! the connection, remote paths, and sync options, so identical requests
//! always land in the same mirror.
//!
//! # Cache States
//!
//! | State | Meaning |
//! |-------|---------|
//! | Missing | No directory for the key yet |
//! | Fresh | Last successful sync is within the TTL |
//! | Expired | Older than the TTL, still readable |
//!
//! A key with a valid lock sidecar is being synced and is never removed by
//! cleanup.

pub mod key;
pub mod lock;
pub mod store;

pub use key::{derive_key, is_cache_key, SyncOptions};
pub use lock::{LockGuard, LockInfo, LockManager};
pub use store::{CacheState, CacheStatus, CacheStore};

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
