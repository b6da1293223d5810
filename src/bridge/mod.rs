//! Execution bridges for the transfer tooling
//!
//! `rsync` and `ssh` do not always run directly on the host:
//! - Linux/macOS: run natively
//! - Windows: run inside WSL, with drive-letter paths mapped to `/mnt/<drive>`
//!
//! A bridge knows how to wrap a command line and how to translate local
//! paths into the form the tools inside it expect.

mod factory;
mod native;
mod wsl;

pub use factory::{create_bridge, BridgeKind, Platform};
pub use native::NativeBridge;
pub use wsl::{DriveMountTranslator, WslBridge};

use crate::error::{RmirrorError, RmirrorResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::process::Output;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

/// Max number of output lines kept for error messages
const ERROR_TAIL_LINES: usize = 50;

/// Which side of the bridge a path should be expressed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathTarget {
    /// The host's native form (e.g. `C:\Users\dev`)
    Host,
    /// The form tools inside the bridge expect (e.g. `/mnt/c/Users/dev`)
    Bridge,
}

/// Converts paths between the host and the bridge environment
pub trait PathTranslator: Send + Sync {
    fn translate(&self, path: &str, target: PathTarget) -> String;
}

/// Paths are the same on both sides
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslator;

impl PathTranslator for IdentityTranslator {
    fn translate(&self, path: &str, _target: PathTarget) -> String {
        path.to_string()
    }
}

/// A program invocation, independent of the bridge that will run it
///
/// Environment values are never printed: they are used to hand secrets
/// (the sshpass password) to the child without putting them in argv.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Whether `flag` appears as an argument
    pub fn has_arg(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env_keys)
            .finish()
    }
}

/// Environment that runs rsync/ssh on behalf of the host
#[async_trait]
pub trait ExecutionBridge: Send + Sync {
    /// Short name used in messages and config (`native`, `wsl`)
    fn name(&self) -> &'static str;

    /// Path translation strategy for this bridge
    fn translator(&self) -> &dyn PathTranslator;

    /// Build a host command that runs `invocation` inside the bridge
    fn command(&self, invocation: &Invocation) -> Command;

    /// Check the bridge itself can run commands
    async fn is_available(&self) -> bool;

    /// Human-readable version of the bridge
    async fn version(&self) -> RmirrorResult<String>;

    /// Check a tool can be executed inside the bridge
    async fn has_tool(&self, tool: &str) -> bool {
        let version = Invocation::new(tool).arg("--version");
        let mut cmd = self.command(&version);
        cmd.stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        // sshpass and some ssh builds exit non-zero for --version; spawning is enough
        cmd.status().await.is_ok()
    }
}

/// Run to completion, capturing output, killing the child on timeout
pub(crate) async fn output_with_timeout(
    mut cmd: Command,
    limit: Duration,
    operation: &str,
) -> RmirrorResult<Output> {
    cmd.stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);

    match tokio::time::timeout(limit, cmd.output()).await {
        Ok(result) => result.map_err(|e| RmirrorError::command_failed(operation, e)),
        // Dropping the output future kills the child (kill_on_drop)
        Err(_) => Err(RmirrorError::Timeout {
            operation: operation.to_string(),
            after: limit,
        }),
    }
}

/// Spawn with piped stdout/stderr for streaming
pub(crate) fn spawn_piped(mut cmd: Command, operation: &str) -> RmirrorResult<Child> {
    cmd.stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RmirrorError::command_failed(operation, e))
}

/// Output kept from a streamed child: a bounded tail plus selected lines
#[derive(Debug, Default)]
pub(crate) struct CapturedOutput {
    tail: VecDeque<String>,
    kept: Vec<String>,
}

impl CapturedOutput {
    fn push(&mut self, line: &str, keep: bool) {
        if self.tail.len() == ERROR_TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line.to_string());
        if keep {
            self.kept.push(line.to_string());
        }
    }

    /// Last lines of combined output, for actionable error messages
    pub(crate) fn tail(&self) -> String {
        self.tail
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every line the `keep` predicate accepted, in order
    pub(crate) fn kept(&self) -> &[String] {
        &self.kept
    }
}

/// Stream stdout+stderr from a child process, calling `on_output` per line.
///
/// Lines are split on both `\n` and `\r`: rsync redraws its progress line
/// with carriage returns. Only the last lines and those accepted by `keep`
/// are retained.
pub(crate) async fn stream_child_output(
    child: &mut Child,
    on_output: &(dyn Fn(&str) + Send + Sync),
    keep: &(dyn Fn(&str) -> bool + Send + Sync),
) -> RmirrorResult<CapturedOutput> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| RmirrorError::Internal("child stderr not piped".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| RmirrorError::Internal("child stdout not piped".to_string()))?;

    let mut stderr_reader = BufReader::new(stderr).split(b'\r');
    let mut stdout_reader = BufReader::new(stdout).split(b'\r');

    let mut captured = CapturedOutput::default();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        let chunk = tokio::select! {
            chunk = stderr_reader.next_segment(), if !stderr_done => match chunk {
                Ok(Some(chunk)) => chunk,
                _ => {
                    stderr_done = true;
                    continue;
                }
            },
            chunk = stdout_reader.next_segment(), if !stdout_done => match chunk {
                Ok(Some(chunk)) => chunk,
                _ => {
                    stdout_done = true;
                    continue;
                }
            },
        };

        for line in String::from_utf8_lossy(&chunk).split('\n') {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            on_output(line);
            captured.push(line, keep(line));
        }
    }

    Ok(captured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_display_quotes_whitespace() {
        let inv = Invocation::new("rsync").args(["-a", "/tmp/my dir/"]);
        assert_eq!(inv.to_string(), "rsync -a '/tmp/my dir/'");
    }

    #[test]
    fn invocation_debug_hides_env_values() {
        let inv = Invocation::new("sshpass").arg("-e").env("SSHPASS", "hunter2");
        let debug = format!("{:?}", inv);
        assert!(debug.contains("SSHPASS"));
        assert!(!debug.contains("hunter2"));
        assert!(!inv.to_string().contains("hunter2"));
    }

    #[test]
    fn captured_output_keeps_bounded_tail() {
        let mut captured = CapturedOutput::default();
        for i in 0..80 {
            let line = format!("line {}", i);
            captured.push(&line, i == 3);
        }
        let tail = captured.tail();
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 79"));
        assert_eq!(tail.lines().count(), ERROR_TAIL_LINES);
        assert_eq!(captured.kept(), ["line 3".to_string()]);
        assert_eq!(CapturedOutput::default().tail(), "");
    }

    #[test]
    fn identity_translator() {
        let t = IdentityTranslator;
        assert_eq!(t.translate("/home/dev", PathTarget::Bridge), "/home/dev");
        assert_eq!(t.translate("/home/dev", PathTarget::Host), "/home/dev");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_with_timeout_kills_slow_command() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = output_with_timeout(cmd, Duration::from_millis(100), "sleep")
            .await
            .unwrap_err();
        assert!(matches!(err, RmirrorError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stream_splits_carriage_returns() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf 'a 10%%\\rb 50%%\\rc 100%%\\ndone\\n'; echo oops >&2"]);
        let mut child = spawn_piped(cmd, "sh").unwrap();

        let seen = std::sync::Mutex::new(Vec::new());
        let captured = stream_child_output(
            &mut child,
            &|line| seen.lock().unwrap().push(line.to_string()),
            &|line| line == "done",
        )
        .await
        .unwrap();
        child.wait().await.unwrap();

        let seen = seen.into_inner().unwrap();
        for expected in ["a 10%", "b 50%", "c 100%", "done", "oops"] {
            assert!(seen.contains(&expected.to_string()), "missing {}", expected);
        }
        assert_eq!(captured.kept(), ["done".to_string()]);
        assert!(captured.tail().contains("oops"));
    }
}
