//! Native bridge: rsync and ssh run directly on the host

use crate::bridge::{output_with_timeout, ExecutionBridge, IdentityTranslator, Invocation, PathTranslator};
use crate::error::{RmirrorError, RmirrorResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

/// Runs tools on the host with no path translation
#[derive(Debug, Clone, Default)]
pub struct NativeBridge {
    translator: IdentityTranslator,
}

impl NativeBridge {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionBridge for NativeBridge {
    fn name(&self) -> &'static str {
        "native"
    }

    fn translator(&self) -> &dyn PathTranslator {
        &self.translator
    }

    fn command(&self, invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }
        cmd
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn version(&self) -> RmirrorResult<String> {
        let cmd = self.command(&Invocation::new("uname").arg("-sr"));
        match output_with_timeout(cmd, Duration::from_secs(5), "uname -sr").await {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
            }
            Ok(_) | Err(RmirrorError::CommandFailed { .. }) => Ok(std::env::consts::OS.to_string()),
            Err(e) => Err(e),
        }
    }
}
