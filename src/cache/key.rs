//! Cache key derivation
//!
//! A cache key binds (connection, remote paths, sync options) to one local
//! mirror directory. Keys are the first 16 hex chars of a SHA-256 over a
//! canonical JSON document, so the same logical request maps to the same
//! directory across restarts and no host or user name leaks into the key.

use crate::connection::{Connection, RemotePaths};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Length of a cache key in hex characters
pub const KEY_LEN: usize = 16;

/// Options that change what ends up in the mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Mirror directories recursively
    pub recursive: bool,
    /// File extensions to skip (with or without the leading dot)
    pub exclude_extensions: Vec<String>,
    /// Regular expressions matched against entry names
    pub exclude_patterns: Vec<String>,
    /// Directory names to skip at any depth
    pub exclude_dirs: Vec<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            exclude_extensions: Vec::new(),
            exclude_patterns: Vec::new(),
            exclude_dirs: Vec::new(),
        }
    }
}

impl SyncOptions {
    /// Copy with every collection sorted and de-duplicated
    pub fn canonical(&self) -> Self {
        Self {
            recursive: self.recursive,
            exclude_extensions: canonical_set(self.exclude_extensions.iter().map(|e| normalize_extension(e))),
            exclude_patterns: canonical_set(self.exclude_patterns.iter().map(|p| p.to_string())),
            exclude_dirs: canonical_set(
                self.exclude_dirs
                    .iter()
                    .map(|d| d.trim().trim_matches('/').to_string()),
            ),
        }
    }
}

/// `".LOG"` and `"log"` both become `"log"`
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

fn canonical_set(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = items.filter(|s| !s.is_empty()).collect();
    out.sort();
    out.dedup();
    out
}

/// Derive the cache key for a request
///
/// The password is not part of the key: rotating a password must not
/// orphan an existing mirror.
pub fn derive_key(connection: &Connection, paths: &RemotePaths, options: &SyncOptions) -> String {
    let (directories, files) = paths.normalized();
    let options = options.canonical();

    // BTreeMap keeps object keys in alphabetical order when serialized
    let mut doc: BTreeMap<&str, serde_json::Value> = BTreeMap::new();
    doc.insert("host", connection.host.trim().to_lowercase().into());
    doc.insert("port", connection.port.into());
    doc.insert("username", connection.username.trim().into());
    doc.insert("directories", directories.into());
    doc.insert("files", files.into());
    doc.insert("recursive", options.recursive.into());
    doc.insert("exclude_extensions", options.exclude_extensions.into());
    doc.insert("exclude_patterns", options.exclude_patterns.into());
    doc.insert("exclude_dirs", options.exclude_dirs.into());

    // Serializing a map of plain JSON values cannot fail
    let canonical = serde_json::to_string(&doc).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();

    hex::encode(&digest[..KEY_LEN / 2])
}

/// Whether a string has the shape of a derived cache key
pub fn is_cache_key(s: &str) -> bool {
    s.len() == KEY_LEN && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
