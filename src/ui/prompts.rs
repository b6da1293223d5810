//! Confirmation prompt with non-interactive fallback

use super::context::UiContext;
use crate::error::{RmirrorError, RmirrorResult};

/// Ask for confirmation; `--yes` approves, non-interactive runs get `default`
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> RmirrorResult<bool> {
    if ctx.auto_yes() {
        return Ok(true);
    }
    if !ctx.is_interactive() {
        return Ok(default);
    }

    // cliclack blocks on stdin
    let message = message.to_string();
    let result = tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message).initial_value(default).interact()
    })
    .await
    .map_err(|e| RmirrorError::Internal(format!("prompt task failed: {}", e)))?;

    result.map_err(|e| RmirrorError::io("reading confirmation", e))
}
