//! rsync and ssh command line construction
//!
//! Pure builders: nothing here spawns a process, so every flag decision is
//! unit tested directly.

use crate::bridge::Invocation;
use crate::cache::store::SIDECAR_PREFIX;
use crate::config::schema::TransferConfig;
use crate::connection::Connection;
use std::path::{Component, Path, PathBuf};

/// Whether a remote path names a directory tree or a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Directory,
    File,
}

/// ssh options shared by rsync's `-e` and the preflight checks
pub fn ssh_options(connection: &Connection, connect_timeout_secs: u64) -> Vec<String> {
    let mut opts = vec![
        "-p".to_string(),
        connection.port.to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", connect_timeout_secs),
    ];
    // Without a password, never fall back to an interactive prompt
    if !connection.uses_password() {
        opts.push("-o".to_string());
        opts.push("BatchMode=yes".to_string());
    }
    opts
}

/// Wrap an invocation with `sshpass -e` when the connection has a password
///
/// The password travels in the `SSHPASS` environment variable, never argv.
pub fn with_password(invocation: Invocation, connection: &Connection, sshpass_path: &str) -> Invocation {
    match connection.password {
        Some(ref password) => Invocation::new(sshpass_path)
            .arg("-e")
            .arg(invocation.program)
            .args(invocation.args)
            .env("SSHPASS", password.as_str()),
        None => invocation,
    }
}

/// Local directory a remote path is mirrored into
///
/// Directories land at `<cache>/<remote path>`, files inside
/// `<cache>/<remote parent>`. `..` and `.` components are dropped so a
/// remote path can never escape the cache directory.
pub fn mirror_destination(cache_dir: &Path, remote_path: &str, kind: SourceKind) -> PathBuf {
    let parts: Vec<&str> = Path::new(remote_path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();

    let keep = match kind {
        SourceKind::Directory => parts.len(),
        SourceKind::File => parts.len().saturating_sub(1),
    };

    let mut dest = cache_dir.to_path_buf();
    for part in &parts[..keep] {
        dest.push(part);
    }
    dest
}

/// Builder for one rsync invocation (one remote path)
#[derive(Debug, Clone)]
pub struct RsyncCommand {
    rsync_path: String,
    ssh_path: String,
    sshpass_path: String,
    connect_timeout_secs: u64,
    extra_args: Vec<String>,
    connection: Connection,
    remote_path: String,
    kind: SourceKind,
    destination: String,
    recursive: bool,
    excludes: Vec<String>,
    dry_run: bool,
}

impl RsyncCommand {
    /// `destination` must already be in the bridge's path form
    pub fn new(
        tools: &TransferConfig,
        connection: &Connection,
        remote_path: &str,
        kind: SourceKind,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            rsync_path: tools.rsync_path.clone(),
            ssh_path: tools.ssh_path.clone(),
            sshpass_path: tools.sshpass_path.clone(),
            connect_timeout_secs: tools.connect_timeout_secs,
            extra_args: tools.extra_args.clone(),
            connection: connection.clone(),
            remote_path: remote_path.to_string(),
            kind,
            destination: destination.into(),
            recursive: true,
            excludes: Vec::new(),
            dry_run: false,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Pre-rendered `--exclude=` arguments
    pub fn excludes(mut self, excludes: Vec<String>) -> Self {
        self.excludes = excludes;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn ssh_command(&self) -> String {
        let mut parts = vec![self.ssh_path.clone()];
        parts.extend(ssh_options(&self.connection, self.connect_timeout_secs));
        parts.join(" ")
    }

    fn source(&self) -> String {
        match self.kind {
            SourceKind::File => self.connection.rsync_source(&self.remote_path),
            SourceKind::Directory => {
                // Trailing slash: copy the contents, not the directory itself
                let dir = self.remote_path.trim_end_matches('/');
                self.connection.rsync_source(&format!("{}/", dir))
            }
        }
    }

    /// Build the invocation, wrapped with sshpass when needed
    pub fn build(&self) -> Invocation {
        let mut args: Vec<String> = Vec::new();

        match self.kind {
            SourceKind::Directory => {
                args.push("-a".to_string());
                if !self.recursive {
                    args.push("--no-recursive".to_string());
                    args.push("--dirs".to_string());
                }
                args.push("--delete".to_string());
                args.push("--delete-excluded".to_string());
            }
            // Archive without -r; a single file must never trigger deletions
            SourceKind::File => args.push("-lptgoD".to_string()),
        }

        args.push("--partial".to_string());
        args.push("--protect-args".to_string());

        // Keep our own sidecars out of the transfer and safe from --delete
        args.push(format!("--filter=P /{}*", SIDECAR_PREFIX));
        args.push(format!("--exclude=/{}*", SIDECAR_PREFIX));

        if self.kind == SourceKind::Directory {
            args.extend(self.excludes.iter().cloned());
        }

        if self.dry_run {
            args.push("--dry-run".to_string());
            args.push("--itemize-changes".to_string());
            args.push("--stats".to_string());
        } else {
            args.push("--stats".to_string());
            args.push("--info=progress2".to_string());
        }

        args.extend(self.extra_args.iter().cloned());

        args.push("-e".to_string());
        args.push(self.ssh_command());

        args.push(self.source());
        let mut dest = self.destination.clone();
        if !dest.ends_with('/') {
            dest.push('/');
        }
        args.push(dest);

        let invocation = Invocation::new(&self.rsync_path).args(args);
        with_password(invocation, &self.connection, &self.sshpass_path)
    }
}
