//! Error types for rmirror
//!
//! All modules use `RmirrorResult<T>` as their return type. Errors are
//! grouped into classes (see [`ErrorClass`]) so callers can render a
//! different affordance for each: retry, force-unlock, wait, or fix setup.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for rmirror operations
pub type RmirrorResult<T> = Result<T, RmirrorError>;

/// Coarse classification of errors, used for exit codes and UI affordances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Environment or remote host not ready; nothing was touched
    Preflight,
    /// Another sync holds the lock for this cache key
    Contention,
    /// The transfer tool failed or timed out
    Operational,
    /// The requested cache does not exist
    NotFound,
    /// Bad configuration or request
    Config,
    /// Anything else (IO, serialization, bugs)
    Internal,
}

impl ErrorClass {
    /// Process exit code for this class
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Preflight => 2,
            Self::Contention => 3,
            Self::Operational => 4,
            Self::NotFound | Self::Config | Self::Internal => 1,
        }
    }
}

/// All errors that can occur in rmirror
#[derive(Error, Debug)]
pub enum RmirrorError {
    // Preflight errors
    #[error("Execution bridge '{bridge}' is not available: {reason}")]
    BridgeUnavailable { bridge: String, reason: String },

    #[error("Required tool not found in {bridge}: {tool}")]
    ToolMissing { bridge: String, tool: String },

    #[error("Host unreachable: {host}: {reason}")]
    HostUnreachable { host: String, reason: String },

    #[error("Authentication failed for {target}")]
    AuthFailed { target: String },

    #[error("Connection to {host} timed out after {}s", .after.as_secs())]
    ConnectionTimeout { host: String, after: Duration },

    #[error("Remote path does not exist: {path}")]
    RemotePathMissing { path: String },

    // Lock errors
    #[error("Sync already in progress for cache {key}")]
    LockContention { key: String },

    // Transfer errors
    #[error("Transfer failed: {command}\n{stderr}")]
    Transfer { command: String, stderr: String },

    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout { operation: String, after: Duration },

    // Cache errors
    #[error("Cache not found: {0}")]
    CacheNotFound(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RmirrorError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error (the process could not be spawned)
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a transfer error carrying captured diagnostic output
    pub fn transfer(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Transfer {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Classify the error for callers
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::BridgeUnavailable { .. }
            | Self::ToolMissing { .. }
            | Self::HostUnreachable { .. }
            | Self::AuthFailed { .. }
            | Self::ConnectionTimeout { .. }
            | Self::RemotePathMissing { .. } => ErrorClass::Preflight,
            Self::LockContention { .. } => ErrorClass::Contention,
            Self::Transfer { .. } | Self::Timeout { .. } | Self::CommandFailed { .. } => {
                ErrorClass::Operational
            }
            Self::CacheNotFound(_) => ErrorClass::NotFound,
            Self::ConfigInvalid { .. } | Self::ConfigDirCreate { .. } | Self::InvalidRequest(_) => {
                ErrorClass::Config
            }
            Self::Io { .. }
            | Self::Json(_)
            | Self::TomlParse(_)
            | Self::TomlSerialize(_)
            | Self::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Check if retrying the same request may succeed without operator action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::HostUnreachable { .. }
                | Self::LockContention { .. }
                | Self::Timeout { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::BridgeUnavailable { bridge, .. } if bridge == "wsl" => {
                Some("Install WSL with: wsl --install, then install rsync inside it".to_string())
            }
            Self::BridgeUnavailable { .. } => {
                Some("Set bridge.kind in the config file (native or wsl)".to_string())
            }
            Self::ToolMissing { tool, .. } if tool == "sshpass" => Some(
                "Install sshpass, or use key-based authentication instead of a password"
                    .to_string(),
            ),
            Self::ToolMissing { tool, .. } => Some(format!("Install {} and make sure it is on PATH", tool)),
            Self::AuthFailed { .. } => {
                Some("Check the username/password or load your key with: ssh-add".to_string())
            }
            Self::LockContention { key } => Some(format!(
                "Wait for the running sync, or run: rmirror unlock --key {}",
                key
            )),
            Self::CacheNotFound(_) => Some("Run `rmirror sync` for this target first".to_string()),
            Self::Timeout { .. } => Some(
                "Raise transfer.transfer_timeout_secs or narrow the synced paths".to_string(),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = RmirrorError::LockContention {
            key: "0123456789abcdef".to_string(),
        };
        assert!(err.to_string().contains("already in progress"));
        assert!(err.to_string().contains("0123456789abcdef"));
    }

    #[test]
    fn timeout_display_uses_seconds() {
        let err = RmirrorError::Timeout {
            operation: "rsync dry run".to_string(),
            after: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "rsync dry run timed out after 30s");
    }

    #[test]
    fn error_classes_are_distinguishable() {
        let preflight = RmirrorError::RemotePathMissing {
            path: "/srv/data".to_string(),
        };
        let contention = RmirrorError::LockContention {
            key: "k".to_string(),
        };
        let operational = RmirrorError::transfer("rsync", "boom");
        let missing = RmirrorError::CacheNotFound("k".to_string());

        assert_eq!(preflight.class(), ErrorClass::Preflight);
        assert_eq!(contention.class(), ErrorClass::Contention);
        assert_eq!(operational.class(), ErrorClass::Operational);
        assert_eq!(missing.class(), ErrorClass::NotFound);
    }

    #[test]
    fn exit_codes_by_class() {
        assert_eq!(ErrorClass::Preflight.exit_code(), 2);
        assert_eq!(ErrorClass::Contention.exit_code(), 3);
        assert_eq!(ErrorClass::Operational.exit_code(), 4);
        assert_eq!(ErrorClass::Internal.exit_code(), 1);
    }

    #[test]
    fn contention_hint_names_key() {
        let err = RmirrorError::LockContention {
            key: "abc".to_string(),
        };
        assert_eq!(
            err.hint().as_deref(),
            Some("Wait for the running sync, or run: rmirror unlock --key abc")
        );
    }

    #[test]
    fn error_retryable() {
        assert!(RmirrorError::LockContention { key: "k".into() }.is_retryable());
        assert!(!RmirrorError::AuthFailed {
            target: "u@h:22".into()
        }
        .is_retryable());
    }
}
