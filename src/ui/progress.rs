//! Progress indicators with CI fallback

use super::context::UiContext;
use crate::transfer::TransferProgress;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }

    /// Remove the spinner without a message
    pub fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.clear();
        }
    }
}

/// Percentage bar fed by rsync progress updates
///
/// Interactive terminals get an indicatif bar. Plain mode prints nothing;
/// the transfer logs its own 10% checkpoints at `-v`.
#[derive(Clone)]
pub struct TransferBar {
    bar: Option<ProgressBar>,
}

impl TransferBar {
    pub fn new(ctx: &UiContext, label: &str) -> Self {
        let bar = ctx.use_fancy_output().then(|| {
            let bar = ProgressBar::new(100);
            let style = ProgressStyle::default_bar()
                .template("  {spinner:.cyan} {prefix}  {bar:24.cyan/dim} {pos:>3}%  {msg:.dim}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("━╸─");
            bar.set_style(style);
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            bar
        });
        Self { bar }
    }

    pub fn update(&self, progress: &TransferProgress) {
        if let Some(ref bar) = self.bar {
            bar.set_position(u64::from(progress.percent));
            bar.set_message(format!("{} ({} files)", progress.remote_path, progress.files_done));
        }
    }

    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }

    pub fn abandon(&self) {
        if let Some(ref bar) = self.bar {
            bar.abandon();
        }
    }
}
