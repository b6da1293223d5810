//! Sync command - mirror remote paths into the local cache

use crate::cache::{format_bytes, CacheState};
use crate::cli::args::{OutputFormat, SyncArgs};
use crate::config::Config;
use crate::error::{RmirrorError, RmirrorResult};
use crate::sync::{SyncOrchestrator, SyncOutcome, SyncStatus};
use crate::transfer::TransferProgress;
use crate::ui::{self, TransferBar, UiContext};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Execute the sync command
pub async fn execute(args: SyncArgs, config: &Config) -> RmirrorResult<()> {
    let ctx = UiContext::for_format(args.format.is_json());
    let request = args.target.request()?;

    let bar = TransferBar::new(&ctx, &request.connection.to_string());
    let feed = bar.clone();
    let orchestrator = SyncOrchestrator::from_config(config)
        .with_progress(Arc::new(move |p: &TransferProgress| feed.update(p)));

    if args.if_stale {
        let key = SyncOrchestrator::cache_key(&request);
        let status = orchestrator.status_for_key(&key).await?;
        if status.state == CacheState::Fresh && !status.locked {
            debug!(key = %key, "Cache is fresh, skipping transfer");
            return print_skipped(&ctx, args.format, &status);
        }
    }

    if args.format == OutputFormat::Table {
        ui::intro(&ctx, &format!("Syncing from {}", request.connection));
    }

    // Dropping the sync future releases the lock and kills rsync
    let result = tokio::select! {
        result = orchestrator.sync(&request) => result,
        _ = tokio::signal::ctrl_c() => {
            Err(RmirrorError::Internal("sync interrupted".to_string()))
        }
    };

    let outcome = match result {
        Ok(outcome) => {
            bar.finish();
            outcome
        }
        Err(e) => {
            bar.abandon();
            return Err(e);
        }
    };

    match args.format {
        OutputFormat::Json => ui::print_json(&outcome)?,
        OutputFormat::Plain => println!("{}", outcome.cache_path.display()),
        OutputFormat::Table => print_outcome(&ctx, &outcome),
    }

    Ok(())
}

fn print_outcome(ctx: &UiContext, outcome: &SyncOutcome) {
    ui::step_ok_detail(ctx, "Mirror updated", &outcome.cache_key);

    ui::section(ctx, "Transfer");
    ui::key_value(
        ctx,
        "Files",
        &format!(
            "{} transferred ({} estimated)",
            outcome.stats.files_transferred, outcome.dry_run.estimated_file_count
        ),
    );
    ui::key_value(ctx, "Bytes", &format_bytes(outcome.stats.bytes_transferred));
    ui::key_value(
        ctx,
        "Duration",
        &format!("{:.1}s", outcome.stats.duration.as_secs_f64()),
    );

    ui::section(ctx, "Mirrors");
    for mirror in &outcome.mirrors {
        ui::key_value(ctx, &mirror.remote, &mirror.local.display().to_string());
    }

    ui::outro_success(ctx, &outcome.cache_path.display().to_string());
}

fn print_skipped(ctx: &UiContext, format: OutputFormat, status: &SyncStatus) -> RmirrorResult<()> {
    match format {
        OutputFormat::Json => ui::print_json(&serde_json::json!({
            "skipped": true,
            "status": status,
        }))?,
        OutputFormat::Plain => println!("{}", status.cache_path.display()),
        OutputFormat::Table => {
            ui::step_info(
                ctx,
                &format!(
                    "Cache {} is fresh (synced {}), skipping",
                    status.cache_key,
                    ui::format_age(status.last_synced_at, Utc::now())
                ),
            );
            ui::key_value(ctx, "Path", &status.cache_path.display().to_string());
        }
    }
    Ok(())
}
