//! Config command - show or edit configuration

use crate::bridge::BridgeKind;
use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{RmirrorError, RmirrorResult};
use crate::ui::{self, UiContext};
use std::path::PathBuf;

/// Keys accepted by `config set`
const VALID_KEYS: [&str; 16] = [
    "general.log_format",
    "general.audit_log",
    "cache.root",
    "cache.ttl_hours",
    "cache.max_lock_age_minutes",
    "cache.cleanup_max_age_hours",
    "transfer.rsync_path",
    "transfer.ssh_path",
    "transfer.sshpass_path",
    "transfer.dry_run_timeout_secs",
    "transfer.transfer_timeout_secs",
    "transfer.connect_timeout_secs",
    "transfer.extra_args",
    "bridge.kind",
    "bridge.wsl_distro",
    "bridge.mount_prefix",
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> RmirrorResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => {
            let ctx = UiContext::detect();
            let mut updated = config.clone();
            if let Err(e) = apply(&mut updated, &key, &value) {
                if matches!(e, RmirrorError::InvalidRequest(ref msg) if msg.starts_with("Unknown")) {
                    ui::remark(&ctx, "Valid keys:");
                    for key in VALID_KEYS {
                        eprintln!("  {}", key);
                    }
                }
                return Err(e);
            }
            manager.save(&updated).await?;
            ui::step_ok(&ctx, &format!("Set {} = {}", key, value));
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> RmirrorResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> RmirrorResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());
    Ok(())
}

/// Set a dot-separated key on `config`
fn apply(config: &mut Config, key: &str, value: &str) -> RmirrorResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => {
            if !matches!(value, "text" | "json") {
                return Err(RmirrorError::InvalidRequest(format!(
                    "Invalid log format: {}. Use text or json",
                    value
                )));
            }
            config.general.log_format = value.to_string();
        }
        ["general", "audit_log"] => config.general.audit_log = parse_bool(value)?,

        ["cache", "root"] => {
            config.cache.root = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        ["cache", "ttl_hours"] => config.cache.ttl_hours = parse_u32(value)?,
        ["cache", "max_lock_age_minutes"] => config.cache.max_lock_age_minutes = parse_u32(value)?,
        ["cache", "cleanup_max_age_hours"] => {
            config.cache.cleanup_max_age_hours = parse_u32(value)?
        }

        ["transfer", "rsync_path"] => config.transfer.rsync_path = value.to_string(),
        ["transfer", "ssh_path"] => config.transfer.ssh_path = value.to_string(),
        ["transfer", "sshpass_path"] => config.transfer.sshpass_path = value.to_string(),
        ["transfer", "dry_run_timeout_secs"] => {
            config.transfer.dry_run_timeout_secs = parse_u64(value)?
        }
        ["transfer", "transfer_timeout_secs"] => {
            config.transfer.transfer_timeout_secs = parse_u64(value)?
        }
        ["transfer", "connect_timeout_secs"] => {
            config.transfer.connect_timeout_secs = parse_u64(value)?
        }
        ["transfer", "extra_args"] => {
            config.transfer.extra_args = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        ["bridge", "kind"] => {
            config.bridge.kind = value
                .parse::<BridgeKind>()
                .map_err(RmirrorError::InvalidRequest)?
        }
        ["bridge", "wsl_distro"] => {
            config.bridge.wsl_distro = (!value.is_empty()).then(|| value.to_string());
        }
        ["bridge", "mount_prefix"] => config.bridge.mount_prefix = value.to_string(),

        _ => {
            return Err(RmirrorError::InvalidRequest(format!(
                "Unknown config key: {}",
                key
            )))
        }
    }

    Ok(())
}

fn parse_bool(value: &str) -> RmirrorResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(RmirrorError::InvalidRequest(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}

fn parse_u32(value: &str) -> RmirrorResult<u32> {
    value
        .parse()
        .map_err(|_| RmirrorError::InvalidRequest(format!("Invalid number: {}", value)))
}

fn parse_u64(value: &str) -> RmirrorResult<u64> {
    value
        .parse()
        .map_err(|_| RmirrorError::InvalidRequest(format!("Invalid number: {}", value)))
}
