//! Cleanup command - remove old, unlocked cache entries

use crate::cache::format_bytes;
use crate::cli::args::{CleanupArgs, OutputFormat};
use crate::config::Config;
use crate::error::{RmirrorError, RmirrorResult};
use crate::sync::{CleanupReport, SyncOrchestrator};
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the cleanup command
pub async fn execute(args: CleanupArgs, config: &Config) -> RmirrorResult<()> {
    let ctx = UiContext::for_format(args.format.is_json()).with_auto_yes(args.yes);
    let hours = args
        .max_age_hours
        .unwrap_or(config.cache.cleanup_max_age_hours);

    if hours == 0 {
        let confirmed = ui::confirm(&ctx, "Remove every unlocked cache?", false).await?;
        if !confirmed {
            if ctx.is_interactive() {
                ui::outro_warn(&ctx, "Cleanup cancelled");
                return Ok(());
            }
            return Err(RmirrorError::InvalidRequest(
                "--max-age-hours 0 removes every unlocked cache; pass --yes to confirm".to_string(),
            ));
        }
    }

    let orchestrator = SyncOrchestrator::from_config(config);

    let mut spinner = TaskSpinner::new(&ctx);
    if args.format == OutputFormat::Table {
        spinner.start(&format!("Removing caches not synced in {}h", hours));
    }
    let report = orchestrator.cleanup(hours).await;
    if args.format == OutputFormat::Table {
        spinner.stop(&format!(
            "Examined {} cache(s), removed {}",
            report.total_count,
            report.removed.len()
        ));
    }

    match args.format {
        OutputFormat::Json => ui::print_json(&report)?,
        OutputFormat::Plain => {
            for key in &report.removed {
                println!("{}", key);
            }
        }
        OutputFormat::Table => print_report(&ctx, &report),
    }

    Ok(())
}

fn print_report(ctx: &UiContext, report: &CleanupReport) {
    for key in &report.removed {
        ui::step_ok(ctx, &format!("Removed {}", key));
    }
    for key in &report.skipped_locked {
        ui::step_warn_hint(ctx, &format!("Skipped {}", key), "sync in progress");
    }
    for failure in &report.errors {
        ui::step_error_detail(ctx, &failure.cache_key, &failure.error);
    }

    let summary = format!(
        "Reclaimed {} from {} cache(s)",
        format_bytes(report.total_size_reclaimed),
        report.removed.len()
    );
    if report.errors.is_empty() {
        ui::outro_success(ctx, &summary);
    } else {
        ui::outro_warn(ctx, &summary);
    }
}
