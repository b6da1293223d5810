//! WSL bridge for Windows hosts
//!
//! Tools run through `wsl.exe`, so host paths like `C:\Users\dev\cache`
//! must be handed over as `/mnt/c/Users/dev/cache`. Environment variables
//! only cross into WSL when listed in `WSLENV`.

use crate::bridge::{output_with_timeout, ExecutionBridge, Invocation, PathTarget, PathTranslator};
use crate::error::{RmirrorError, RmirrorResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Maps `X:\path` drive-letter paths onto a POSIX mount prefix and back
///
/// `/mnt` for WSL, `/cygdrive` for Cygwin, empty for MSYS (`/c/path`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveMountTranslator {
    mount_prefix: String,
}

impl DriveMountTranslator {
    pub fn new(mount_prefix: impl Into<String>) -> Self {
        Self {
            mount_prefix: mount_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn wsl() -> Self {
        Self::new("/mnt")
    }

    fn to_bridge(&self, path: &str) -> String {
        let bytes = path.as_bytes();
        let has_drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
        if !has_drive {
            return path.replace('\\', "/");
        }

        let drive = (bytes[0] as char).to_ascii_lowercase();
        let rest = path[2..].replace('\\', "/");
        let rest = rest.trim_start_matches('/');
        if rest.is_empty() {
            format!("{}/{}", self.mount_prefix, drive)
        } else {
            format!("{}/{}/{}", self.mount_prefix, drive, rest)
        }
    }

    fn to_host(&self, path: &str) -> String {
        let Some(rest) = path.strip_prefix(&format!("{}/", self.mount_prefix)) else {
            return path.to_string();
        };

        let mut parts = rest.splitn(2, '/');
        let drive = parts.next().unwrap_or_default();
        if drive.len() != 1 || !drive.chars().all(|c| c.is_ascii_alphabetic()) {
            return path.to_string();
        }

        let tail = parts.next().unwrap_or_default().replace('/', "\\");
        format!("{}:\\{}", drive.to_ascii_uppercase(), tail)
    }
}

impl PathTranslator for DriveMountTranslator {
    fn translate(&self, path: &str, target: PathTarget) -> String {
        match target {
            PathTarget::Bridge => self.to_bridge(path),
            PathTarget::Host => self.to_host(path),
        }
    }
}

/// Runs tools inside a WSL distribution
#[derive(Debug, Clone)]
pub struct WslBridge {
    distro: Option<String>,
    translator: DriveMountTranslator,
}

impl WslBridge {
    pub fn new(distro: Option<String>, mount_prefix: &str) -> Self {
        Self {
            distro: distro.filter(|d| !d.is_empty()),
            translator: DriveMountTranslator::new(mount_prefix),
        }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new("wsl.exe");
        if let Some(ref distro) = self.distro {
            cmd.arg("-d").arg(distro);
        }
        cmd
    }
}

#[async_trait]
impl ExecutionBridge for WslBridge {
    fn name(&self) -> &'static str {
        "wsl"
    }

    fn translator(&self) -> &dyn PathTranslator {
        &self.translator
    }

    fn command(&self, invocation: &Invocation) -> Command {
        let mut cmd = self.base_command();
        cmd.arg("-e").arg(&invocation.program).args(&invocation.args);

        if !invocation.env.is_empty() {
            let mut shared: Vec<String> = std::env::var("WSLENV")
                .ok()
                .filter(|v| !v.is_empty())
                .into_iter()
                .collect();
            for (key, value) in &invocation.env {
                cmd.env(key, value);
                shared.push(key.clone());
            }
            cmd.env("WSLENV", shared.join(":"));
        }
        cmd
    }

    async fn is_available(&self) -> bool {
        let mut cmd = self.base_command();
        cmd.args(["-e", "true"]);
        match output_with_timeout(cmd, Duration::from_secs(15), "wsl.exe -e true").await {
            Ok(output) => output.status.success(),
            Err(e) => {
                debug!("WSL check failed: {}", e);
                false
            }
        }
    }

    async fn version(&self) -> RmirrorResult<String> {
        let cmd = self.command(&Invocation::new("uname").arg("-r"));
        let output = output_with_timeout(cmd, Duration::from_secs(15), "wsl.exe uname -r").await?;
        if output.status.success() {
            Ok(format!(
                "WSL {}",
                String::from_utf8_lossy(&output.stdout).trim()
            ))
        } else {
            Err(RmirrorError::BridgeUnavailable {
                bridge: "wsl".to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn has_tool(&self, tool: &str) -> bool {
        // wsl.exe itself always spawns, so ask the distro's shell
        let lookup = Invocation::new("sh").args(["-c", &format!("command -v {}", tool)]);
        let cmd = self.command(&lookup);
        matches!(
            output_with_timeout(cmd, Duration::from_secs(15), "wsl.exe command -v").await,
            Ok(output) if output.status.success()
        )
    }
}
