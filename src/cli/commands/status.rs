//! Status command - cache and lock state for one entry

use crate::cache::{format_bytes, CacheState};
use crate::cli::args::{OutputFormat, StatusArgs};
use crate::cli::commands::resolve_key;
use crate::config::Config;
use crate::error::{RmirrorError, RmirrorResult};
use crate::sync::{SyncOrchestrator, SyncStatus};
use crate::ui::{self, UiContext};
use chrono::Utc;

/// Execute the status command
pub async fn execute(args: StatusArgs, config: &Config) -> RmirrorResult<()> {
    let key = resolve_key(args.key, &args.target)?;
    let orchestrator = SyncOrchestrator::from_config(config);
    let status = orchestrator.status_for_key(&key).await?;
    if args.require_exists && !status.exists {
        return Err(RmirrorError::CacheNotFound(key));
    }

    match args.format {
        OutputFormat::Json => ui::print_json(&status)?,
        OutputFormat::Plain => println!("{}\t{}\t{}", status.cache_key, status.state, status.locked),
        OutputFormat::Table => print_status(&UiContext::detect(), &status),
    }

    Ok(())
}

fn print_status(ctx: &UiContext, status: &SyncStatus) {
    ui::intro(ctx, &format!("Cache {}", status.cache_key));

    ui::key_value(ctx, "Path", &status.cache_path.display().to_string());
    ui::key_value_status(
        ctx,
        "State",
        &status.state.to_string(),
        status.state == CacheState::Fresh,
    );
    ui::key_value(
        ctx,
        "Last sync",
        &ui::format_age(status.last_synced_at, Utc::now()),
    );
    if status.exists {
        ui::key_value(
            ctx,
            "Size",
            &format!("{} in {} files", format_bytes(status.size_bytes), status.file_count),
        );
    }

    match status.lock {
        Some(ref lock) => {
            ui::key_value_status(ctx, "Lock", "held", false);
            ui::key_value(ctx, "Sync id", &lock.sync_id);
            ui::key_value(
                ctx,
                "Acquired",
                &ui::format_age(Some(lock.acquired_at), Utc::now()),
            );
            let owner = if lock.owner_alive() {
                format!("{} (running)", lock.owner_pid)
            } else {
                format!("{} (not running here)", lock.owner_pid)
            };
            ui::key_value(ctx, "Owner pid", &owner);
        }
        None if status.locked => ui::key_value_status(ctx, "Lock", "held", false),
        None => ui::key_value_status(ctx, "Lock", "free", true),
    }

    if status.state == CacheState::Missing {
        ui::outro_warn(ctx, "Not synced yet");
    } else {
        ui::outro_success(ctx, &status.state.to_string());
    }
}
