//! Connectivity preflight
//!
//! Cheap checks run before any lock is taken or cache directory created:
//! the bridge and its tools, SSH reachability and authentication, and the
//! existence of every requested remote path.

use crate::bridge::{output_with_timeout, ExecutionBridge, Invocation};
use crate::config::schema::TransferConfig;
use crate::connection::Connection;
use crate::error::{RmirrorError, RmirrorResult};
use crate::transfer::command::{ssh_options, with_password};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// sshpass exit code for a rejected password
const SSHPASS_BAD_PASSWORD: i32 = 5;

/// ssh exit code for connection-level failures
const SSH_CONNECTION_ERROR: i32 = 255;

/// Extra time allowed on top of ssh's own ConnectTimeout
const CHECK_GRACE: Duration = Duration::from_secs(5);

/// What the environment check found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentInfo {
    pub bridge: String,
    pub available: bool,
    pub bridge_version: Option<String>,
    pub tools: Vec<String>,
}

/// Checks run before a sync touches anything
#[async_trait]
pub trait Preflight: Send + Sync {
    /// Bridge present and the transfer tools runnable inside it
    async fn check_environment(&self, needs_password: bool) -> RmirrorResult<EnvironmentInfo>;

    /// SSH reachability and authentication
    async fn test_connection(&self, connection: &Connection) -> RmirrorResult<bool>;

    /// Whether `path` exists on the remote host
    async fn check_remote_path(&self, connection: &Connection, path: &str) -> RmirrorResult<bool>;
}

/// [`Preflight`] implementation probing with ssh through an execution bridge
pub struct SshPreflight {
    bridge: Arc<dyn ExecutionBridge>,
    config: TransferConfig,
}

impl SshPreflight {
    pub fn new(bridge: Arc<dyn ExecutionBridge>, config: TransferConfig) -> Self {
        Self { bridge, config }
    }

    fn check_timeout(&self) -> Duration {
        self.config.connect_timeout() + CHECK_GRACE
    }

    /// `ssh <opts> -- user@host <remote command>`
    fn ssh_invocation(&self, connection: &Connection, remote_command: &str) -> Invocation {
        let invocation = Invocation::new(&self.config.ssh_path)
            .args(ssh_options(connection, self.config.connect_timeout_secs))
            .arg("--")
            .arg(connection.ssh_target())
            .arg(remote_command);
        with_password(invocation, connection, &self.config.sshpass_path)
    }

    async fn run_remote(
        &self,
        connection: &Connection,
        remote_command: &str,
    ) -> RmirrorResult<std::process::Output> {
        let invocation = self.ssh_invocation(connection, remote_command);
        debug!(command = %invocation, "Running ssh check");

        let limit = self.check_timeout();
        match output_with_timeout(self.bridge.command(&invocation), limit, "ssh check").await {
            Err(RmirrorError::Timeout { .. }) => Err(RmirrorError::ConnectionTimeout {
                host: connection.host.clone(),
                after: limit,
            }),
            other => other,
        }
    }
}

#[async_trait]
impl Preflight for SshPreflight {
    async fn check_environment(&self, needs_password: bool) -> RmirrorResult<EnvironmentInfo> {
        let bridge = self.bridge.name();
        if !self.bridge.is_available().await {
            return Err(RmirrorError::BridgeUnavailable {
                bridge: bridge.to_string(),
                reason: "bridge did not respond to a test command".to_string(),
            });
        }

        let mut tools = vec![self.config.rsync_path.clone(), self.config.ssh_path.clone()];
        if needs_password {
            tools.push(self.config.sshpass_path.clone());
        }
        for tool in &tools {
            if !self.bridge.has_tool(tool).await {
                return Err(RmirrorError::ToolMissing {
                    bridge: bridge.to_string(),
                    tool: tool.clone(),
                });
            }
        }

        let bridge_version = match self.bridge.version().await {
            Ok(version) => Some(version),
            Err(e) => {
                debug!("Could not read bridge version: {}", e);
                None
            }
        };

        Ok(EnvironmentInfo {
            bridge: bridge.to_string(),
            available: true,
            bridge_version,
            tools,
        })
    }

    async fn test_connection(&self, connection: &Connection) -> RmirrorResult<bool> {
        let output = self.run_remote(connection, "true").await?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_ssh_failure(
            output.status.code(),
            &stderr,
            connection,
            self.check_timeout(),
        ))
    }

    async fn check_remote_path(&self, connection: &Connection, path: &str) -> RmirrorResult<bool> {
        let command = format!("test -e {}", shell_quote(path));
        let output = self.run_remote(connection, &command).await?;

        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(classify_ssh_failure(code, &stderr, connection, self.check_timeout()))
            }
        }
    }
}

/// Map a failed ssh check to a preflight error
pub fn classify_ssh_failure(
    code: Option<i32>,
    stderr: &str,
    connection: &Connection,
    timeout: Duration,
) -> RmirrorError {
    let lower = stderr.to_lowercase();
    let reason = stderr.trim().lines().last().unwrap_or("ssh failed").to_string();

    if code == Some(SSHPASS_BAD_PASSWORD)
        || lower.contains("permission denied")
        || lower.contains("authentication failed")
        || lower.contains("too many authentication failures")
    {
        return RmirrorError::AuthFailed {
            target: connection.masked(),
        };
    }

    if lower.contains("timed out") {
        return RmirrorError::ConnectionTimeout {
            host: connection.host.clone(),
            after: timeout,
        };
    }

    const UNREACHABLE: [&str; 5] = [
        "could not resolve",
        "connection refused",
        "no route",
        "network is unreachable",
        "name or service not known",
    ];
    if code == Some(SSH_CONNECTION_ERROR) || UNREACHABLE.iter().any(|m| lower.contains(m)) {
        return RmirrorError::HostUnreachable {
            host: connection.host.clone(),
            reason,
        };
    }

    RmirrorError::transfer(format!("ssh {}", connection.masked()), stderr.trim().to_string())
}

/// Single-quote a string for a POSIX shell
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::NativeBridge;

    fn conn() -> Connection {
        Connection::new("build.example.com", "dev")
    }

    const TIMEOUT: Duration = Duration::from_secs(20);

    #[test]
    fn auth_failures() {
        let err = classify_ssh_failure(
            Some(255),
            "dev@build.example.com: Permission denied (publickey,password).",
            &conn(),
            TIMEOUT,
        );
        assert!(matches!(err, RmirrorError::AuthFailed { .. }));

        let err = classify_ssh_failure(Some(5), "", &conn(), TIMEOUT);
        assert!(matches!(err, RmirrorError::AuthFailed { .. }));
    }

    #[test]
    fn timeouts() {
        let err = classify_ssh_failure(
            Some(255),
            "ssh: connect to host build.example.com port 22: Connection timed out",
            &conn(),
            TIMEOUT,
        );
        assert!(matches!(err, RmirrorError::ConnectionTimeout { .. }));
    }

    #[test]
    fn unreachable_hosts() {
        for stderr in [
            "ssh: Could not resolve hostname nope: Name or service not known",
            "ssh: connect to host 10.0.0.1 port 22: Connection refused",
            "ssh: connect to host 10.0.0.1 port 22: No route to host",
            "kex_exchange_identification: read: Connection reset by peer",
        ] {
            let err = classify_ssh_failure(Some(255), stderr, &conn(), TIMEOUT);
            assert!(
                matches!(err, RmirrorError::HostUnreachable { .. }),
                "{} -> {:?}",
                stderr,
                err
            );
        }
    }

    #[test]
    fn other_failures_are_operational() {
        let err = classify_ssh_failure(Some(2), "test: too many arguments", &conn(), TIMEOUT);
        assert_eq!(err.class(), crate::error::ErrorClass::Operational);
    }

    #[test]
    fn quoting() {
        assert_eq!(shell_quote("/srv/my data"), "'/srv/my data'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn remote_check_invocation_shape() {
        let preflight = SshPreflight::new(Arc::new(NativeBridge::new()), TransferConfig::default());
        let inv = preflight.ssh_invocation(&conn(), "test -e '/srv'");
        assert_eq!(inv.program, "ssh");
        assert!(inv.has_arg("BatchMode=yes"));
        assert!(inv.has_arg("dev@build.example.com"));
        assert_eq!(inv.args.last().unwrap(), "test -e '/srv'");

        let with_pw = preflight.ssh_invocation(&conn().with_password("pw"), "true");
        assert_eq!(with_pw.program, "sshpass");
        assert!(!with_pw.args.iter().any(|a| a == "pw"));
    }

    #[tokio::test]
    async fn missing_tool_fails_environment_check() {
        let config = TransferConfig {
            rsync_path: "rmirror-no-such-rsync".to_string(),
            ..TransferConfig::default()
        };
        let preflight = SshPreflight::new(Arc::new(NativeBridge::new()), config);
        let err = preflight.check_environment(false).await.unwrap_err();
        assert!(
            matches!(err, RmirrorError::ToolMissing { ref tool, .. } if tool == "rmirror-no-such-rsync")
        );
    }
}
