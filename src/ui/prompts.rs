//! Confirmation prompts

use super::context::UiContext;
use crate::error::{PcacheError, PcacheResult};

/// Ask a yes/no question; non-interactive runs get `default`
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> PcacheResult<bool> {
    if ctx.auto_yes() {
        return Ok(true);
    }
    if !ctx.is_interactive() {
        return Ok(default);
    }

    // cliclack blocks on the terminal
    let message = message.to_string();
    let answer = tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message).initial_value(default).interact()
    })
    .await
    .map_err(|e| PcacheError::User(format!("Prompt task failed: {}", e)))?;

    answer.map_err(|e| PcacheError::User(format!("Prompt failed: {}", e)))
}
