//! Unlock command - remove a stuck sync lock

use crate::cli::args::{OutputFormat, UnlockArgs};
use crate::cli::commands::resolve_key;
use crate::config::Config;
use crate::error::{RmirrorError, RmirrorResult};
use crate::sync::SyncOrchestrator;
use crate::ui::{self, UiContext};
use chrono::Utc;

/// Execute the unlock command
pub async fn execute(args: UnlockArgs, config: &Config) -> RmirrorResult<()> {
    let ctx = UiContext::for_format(args.format.is_json()).with_auto_yes(args.yes);
    let key = resolve_key(args.key, &args.target)?;
    let orchestrator = SyncOrchestrator::from_config(config);

    let status = orchestrator.status_for_key(&key).await?;
    if let Some(ref lock) = status.lock {
        if args.format == OutputFormat::Table {
            ui::step_warn(
                &ctx,
                &format!(
                    "Lock held by sync {} (pid {}, acquired {})",
                    lock.sync_id,
                    lock.owner_pid,
                    ui::format_age(Some(lock.acquired_at), Utc::now())
                ),
            );
        }

        if !ui::confirm(&ctx, "Remove the lock?", false).await? {
            if ctx.is_interactive() {
                ui::outro_warn(&ctx, "Lock kept");
                return Ok(());
            }
            return Err(RmirrorError::InvalidRequest(
                "pass --yes to remove the lock non-interactively".to_string(),
            ));
        }
    }

    let unlocked = orchestrator.force_unlock_key(&key).await?;

    match args.format {
        OutputFormat::Json => ui::print_json(&serde_json::json!({
            "cache_key": key,
            "unlocked": unlocked,
        }))?,
        OutputFormat::Plain => println!("{}", unlocked),
        OutputFormat::Table if unlocked => ui::step_ok(&ctx, &format!("Lock removed for {}", key)),
        OutputFormat::Table => ui::step_info(&ctx, &format!("No lock held for {}", key)),
    }

    Ok(())
}
