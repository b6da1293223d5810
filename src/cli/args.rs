//! CLI argument definitions using clap derive

use crate::cache::key::SyncOptions;
use crate::connection::{Connection, RemotePaths, SyncRequest, DEFAULT_SSH_PORT};
use crate::error::{RmirrorError, RmirrorResult};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Default environment variable holding the SSH password
pub const DEFAULT_PASSWORD_ENV: &str = "RMIRROR_PASSWORD";

/// rmirror - mirror remote trees into a local cache over rsync/ssh
///
/// Each (host, paths, filters) combination gets its own cache directory,
/// guarded by a lock while a sync runs.
#[derive(Parser, Debug)]
#[command(name = "rmirror")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "RMIRROR_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mirror remote directories and files into the local cache
    Sync(SyncArgs),

    /// Show cache and lock state for a target
    Status(StatusArgs),

    /// List every cache entry
    List(ListArgs),

    /// Remove old, unlocked cache entries
    Cleanup(CleanupArgs),

    /// Remove a stuck sync lock
    Unlock(UnlockArgs),

    /// Run preflight checks without syncing
    Check(CheckArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Remote host, paths, and filters identifying one cache entry
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Remote host name or address
    #[arg(long)]
    pub host: Option<String>,

    /// SSH port
    #[arg(short, long, default_value_t = DEFAULT_SSH_PORT)]
    pub port: u16,

    /// Remote user name
    #[arg(short, long)]
    pub user: Option<String>,

    /// Environment variable holding the SSH password (key auth when unset)
    #[arg(long, value_name = "VAR", default_value = DEFAULT_PASSWORD_ENV)]
    pub password_env: String,

    /// Remote directory to mirror (repeatable)
    #[arg(short, long = "dir", value_name = "PATH")]
    pub dirs: Vec<String>,

    /// Remote file to mirror (repeatable)
    #[arg(short, long = "file", value_name = "PATH")]
    pub files: Vec<String>,

    /// Only mirror the top level of each directory
    #[arg(long)]
    pub no_recursive: bool,

    /// File extensions to skip (comma-separated)
    #[arg(long = "exclude-ext", value_delimiter = ',')]
    pub exclude_extensions: Vec<String>,

    /// Directory names to skip at any depth (comma-separated)
    #[arg(long = "exclude-dir", value_delimiter = ',')]
    pub exclude_dirs: Vec<String>,

    /// Regular expression matched against entry names (repeatable)
    #[arg(long = "exclude-pattern", value_name = "REGEX")]
    pub exclude_patterns: Vec<String>,
}

impl TargetArgs {
    /// Whether any target field was given
    pub fn is_set(&self) -> bool {
        self.host.is_some() || self.user.is_some() || !self.dirs.is_empty() || !self.files.is_empty()
    }

    /// Build the connection, reading the password from the environment
    pub fn connection(&self) -> RmirrorResult<Connection> {
        let host = self
            .host
            .clone()
            .ok_or_else(|| RmirrorError::InvalidRequest("--host is required".to_string()))?;
        let user = self
            .user
            .clone()
            .ok_or_else(|| RmirrorError::InvalidRequest("--user is required".to_string()))?;

        let mut connection = Connection::new(host, user).with_port(self.port);
        if let Ok(password) = std::env::var(&self.password_env) {
            connection = connection.with_password(password);
        }
        Ok(connection)
    }

    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            recursive: !self.no_recursive,
            exclude_extensions: self.exclude_extensions.clone(),
            exclude_patterns: self.exclude_patterns.clone(),
            exclude_dirs: self.exclude_dirs.clone(),
        }
    }

    pub fn request(&self) -> RmirrorResult<SyncRequest> {
        Ok(SyncRequest::new(
            self.connection()?,
            RemotePaths::multi(self.dirs.clone(), self.files.clone()),
            self.options(),
        ))
    }
}

/// Arguments for the sync command
#[derive(Parser, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Skip the transfer when the cache is still within its TTL
    #[arg(long)]
    pub if_stale: bool,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Cache key (instead of a target description)
    #[arg(long)]
    pub key: Option<String>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Fail when the cache entry has never been synced
    #[arg(long)]
    pub require_exists: bool,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only show locked entries
    #[arg(long)]
    pub locked: bool,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the cleanup command
#[derive(Parser, Debug)]
pub struct CleanupArgs {
    /// Remove caches not synced for this many hours (0 = all unlocked; default from config)
    #[arg(long)]
    pub max_age_hours: Option<u32>,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the unlock command
#[derive(Parser, Debug)]
pub struct UnlockArgs {
    /// Cache key (instead of a target description)
    #[arg(long)]
    pub key: Option<String>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., cache.ttl_hours)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Table,
    /// JSON output
    Json,
    /// Simple text (one entry per line)
    Plain,
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}
