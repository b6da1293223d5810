//! Check command - run preflight without syncing

use crate::cli::args::{CheckArgs, OutputFormat};
use crate::config::Config;
use crate::error::RmirrorResult;
use crate::preflight::EnvironmentInfo;
use crate::sync::SyncOrchestrator;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the check command
pub async fn execute(args: CheckArgs, config: &Config) -> RmirrorResult<()> {
    let ctx = UiContext::for_format(args.format.is_json());
    let request = args.target.request()?;
    let key = SyncOrchestrator::cache_key(&request);
    let orchestrator = SyncOrchestrator::from_config(config);

    let table = args.format == OutputFormat::Table;
    if table {
        ui::intro(&ctx, &format!("Checking {}", request.connection));
    }

    let mut spinner = TaskSpinner::new(&ctx);
    if table {
        spinner.start("Running preflight checks...");
    }
    let env = match orchestrator.preflight(&request).await {
        Ok(env) => {
            if table {
                spinner.clear();
            }
            env
        }
        Err(e) => {
            if table {
                spinner.stop_error("Preflight failed");
            }
            return Err(e);
        }
    };

    match args.format {
        OutputFormat::Json => ui::print_json(&serde_json::json!({
            "cache_key": key,
            "environment": env,
        }))?,
        OutputFormat::Plain => println!("{}", key),
        OutputFormat::Table => print_report(&ctx, &key, &env, &request.paths.normalized()),
    }

    Ok(())
}

fn print_report(ctx: &UiContext, key: &str, env: &EnvironmentInfo, paths: &(Vec<String>, Vec<String>)) {
    let bridge = match env.bridge_version {
        Some(ref version) => format!("{} ({})", env.bridge, version),
        None => env.bridge.clone(),
    };
    ui::step_ok_detail(ctx, "Execution bridge", &bridge);
    ui::step_ok_detail(ctx, "Tools", &env.tools.join(", "));
    ui::step_ok(ctx, "SSH connection");

    let (dirs, files) = paths;
    for dir in dirs {
        ui::step_ok_detail(ctx, dir, "directory");
    }
    for file in files {
        ui::step_ok_detail(ctx, file, "file");
    }

    ui::key_value(ctx, "Cache key", key);
    ui::outro_success(ctx, "Ready to sync");
}
