//! Audit logging for sync lifecycle events
//!
//! Writes JSON lines to `<state dir>/rmirror/audit.log`. Connections are
//! recorded by their masked identity only.

use crate::config::{schema::Config, ConfigManager};
use crate::connection::Connection;
use chrono::Utc;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// File-based audit logger that appends JSON lines
#[derive(Debug, Clone)]
pub struct AuditLog {
    enabled: bool,
    path: PathBuf,
}

impl AuditLog {
    /// Create a new audit logger from config
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.general.audit_log,
            path: ConfigManager::audit_log_path(),
        }
    }

    /// Audit logger writing to an explicit file
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            enabled: true,
            path,
        }
    }

    /// Audit logger that records nothing
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            path: PathBuf::new(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Log an event tied to a connection, masking its credentials
    pub async fn log_sync(
        &self,
        event: &str,
        connection: &Connection,
        cache_key: &str,
        mut data: serde_json::Value,
    ) {
        if let Some(obj) = data.as_object_mut() {
            obj.insert("connection".to_string(), connection.masked().into());
            obj.insert("cache_key".to_string(), cache_key.into());
        }
        self.log(event, &data).await;
    }

    /// Log an audit event as a JSON line
    ///
    /// IO failures are logged and dropped; they never fail a sync.
    pub async fn log(&self, event: &str, data: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write audit log: {}", e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn writes_json_line() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::with_path(dir.path().join("audit.log"));

        audit
            .log("cache.removed", &serde_json::json!({"cache_key": "0123456789abcdef"}))
            .await;

        let content = tokio::fs::read_to_string(audit.path()).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();

        assert_eq!(parsed["event"], "cache.removed");
        assert_eq!(parsed["data"]["cache_key"], "0123456789abcdef");
        assert!(parsed["timestamp"].is_string());
    }

    #[tokio::test]
    async fn sync_events_mask_password() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::with_path(dir.path().join("audit.log"));
        let conn = Connection::new("box", "dev").with_password("hunter2");

        audit
            .log_sync("sync.started", &conn, "k", serde_json::json!({"sync_id": "s1"}))
            .await;
        audit
            .log_sync("sync.completed", &conn, "k", serde_json::json!({}))
            .await;

        let content = tokio::fs::read_to_string(audit.path()).await.unwrap();
        assert!(!content.contains("hunter2"));
        let lines: Vec<&str> = content.trim().lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["data"]["connection"], "dev@box:22");
        assert_eq!(first["data"]["sync_id"], "s1");
    }

    #[tokio::test]
    async fn skips_when_disabled() {
        let audit = AuditLog::disabled();
        audit.log("should.not.appear", &serde_json::json!({})).await;
        assert_eq!(audit.path(), std::path::Path::new(""));
    }
}
