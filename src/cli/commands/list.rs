//! List command - every cache entry under the root

use crate::cache::format_bytes;
use crate::cli::args::{ListArgs, OutputFormat};
use crate::config::Config;
use crate::error::RmirrorResult;
use crate::sync::{SyncOrchestrator, SyncStatus};
use crate::ui::{self, UiContext};
use chrono::Utc;
use console::style;

/// Execute the list command
pub async fn execute(args: ListArgs, config: &Config) -> RmirrorResult<()> {
    let orchestrator = SyncOrchestrator::from_config(config);
    let entries: Vec<SyncStatus> = orchestrator
        .list()
        .await?
        .into_iter()
        .filter(|s| !args.locked || s.locked)
        .collect();

    if entries.is_empty() {
        match args.format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => {
                let ctx = UiContext::detect();
                ui::step_info(
                    &ctx,
                    &format!("No caches under {}", orchestrator.store().root().display()),
                );
            }
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&entries),
        OutputFormat::Json => ui::print_json(&entries)?,
        OutputFormat::Plain => print_plain(&entries),
    }

    Ok(())
}

fn print_table(entries: &[SyncStatus]) {
    let ctx = UiContext::detect();
    ui::intro(&ctx, "Caches");

    println!(
        "{:<18} {:<9} {:<8} {:>10} {:>8}  {:<12}",
        style("KEY").bold(),
        style("STATE").bold(),
        style("LOCK").bold(),
        style("SIZE").bold(),
        style("FILES").bold(),
        style("LAST SYNC").bold()
    );
    println!("{}", "-".repeat(70));

    let now = Utc::now();
    let mut total = 0;
    for entry in entries {
        let state = match entry.state {
            crate::cache::CacheState::Fresh => style("fresh").green(),
            crate::cache::CacheState::Expired => style("expired").yellow(),
            crate::cache::CacheState::Missing => style("missing").dim(),
        };
        let lock = if entry.locked {
            style("locked").red()
        } else {
            style("-").dim()
        };
        total += entry.size_bytes;

        println!(
            "{:<18} {:<9} {:<8} {:>10} {:>8}  {:<12}",
            entry.cache_key,
            state,
            lock,
            format_bytes(entry.size_bytes),
            entry.file_count,
            ui::format_age(entry.last_synced_at, now)
        );
    }

    println!();
    println!("{} cache(s), {}", entries.len(), format_bytes(total));
}

fn print_plain(entries: &[SyncStatus]) {
    for entry in entries {
        println!("{}", entry.cache_key);
    }
}
