//! Remote connection and request value objects
//!
//! A [`Connection`] never prints or serializes its password. Use
//! [`Connection::masked`] whenever a connection identity has to appear in
//! logs or audit records.

use crate::cache::key::SyncOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// SSH connection parameters for a remote host
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    /// Optional password; when absent, key-based auth is assumed
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl Connection {
    /// Create a key-authenticated connection on the default port
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: username.into(),
            password: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into()).filter(|p: &String| !p.is_empty());
        self
    }

    /// Whether password authentication (via sshpass) is required
    pub fn uses_password(&self) -> bool {
        self.password.is_some()
    }

    /// `user@host` as understood by ssh
    pub fn ssh_target(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    /// `user@host:path` as understood by rsync; IPv6 hosts are bracketed
    pub fn rsync_source(&self, path: &str) -> String {
        if self.host.contains(':') {
            format!("{}@[{}]:{}", self.username, self.host, path)
        } else {
            format!("{}@{}:{}", self.username, self.host, path)
        }
    }

    /// Identity safe for logs: `user@host:port`, never the password
    pub fn masked(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }

    /// Validate the fields needed to build an ssh command line
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host must not be empty".to_string());
        }
        if self.username.trim().is_empty() {
            return Err("username must not be empty".to_string());
        }
        if self.port == 0 {
            return Err("port must be between 1 and 65535".to_string());
        }
        // A leading '-' would be parsed as an ssh option
        if self.host.starts_with('-') || self.username.starts_with('-') {
            return Err("host and username must not start with '-'".to_string());
        }
        if self.host.chars().any(char::is_whitespace) || self.username.contains('@') {
            return Err("host and username must not contain whitespace or '@'".to_string());
        }
        Ok(())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// The remote paths a sync request covers
///
/// `Legacy` is the single-directory form older callers send. It is
/// equivalent to `Multi` with one directory and no files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemotePaths {
    Legacy(String),
    Multi {
        #[serde(default)]
        directories: Vec<String>,
        #[serde(default)]
        files: Vec<String>,
    },
}

impl RemotePaths {
    pub fn multi(directories: Vec<String>, files: Vec<String>) -> Self {
        Self::Multi { directories, files }
    }

    /// Canonical (directories, files): trimmed, sorted, de-duplicated
    pub fn normalized(&self) -> (Vec<String>, Vec<String>) {
        match self {
            Self::Legacy(path) => (normalize_list(std::slice::from_ref(path)), Vec::new()),
            Self::Multi { directories, files } => {
                (normalize_list(directories), normalize_list(files))
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        let (dirs, files) = self.normalized();
        dirs.is_empty() && files.is_empty()
    }
}

/// Normalize a remote path: trim whitespace and trailing slashes
///
/// The root `/` is kept as is. Empty input normalizes to an empty string.
pub fn normalize_remote_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let stripped = trimmed.trim_end_matches('/');
    if stripped.is_empty() {
        "/".to_string()
    } else {
        stripped.to_string()
    }
}

fn normalize_list(paths: &[String]) -> Vec<String> {
    let mut out: Vec<String> = paths
        .iter()
        .map(|p| normalize_remote_path(p))
        .filter(|p| !p.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Everything needed to identify (and sync) one cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub connection: Connection,
    pub paths: RemotePaths,
    #[serde(default)]
    pub options: SyncOptions,
}

impl SyncRequest {
    pub fn new(connection: Connection, paths: RemotePaths, options: SyncOptions) -> Self {
        Self {
            connection,
            paths,
            options,
        }
    }
}
