//! Forget command - drop one file from the cache

use crate::cache::FileKey;
use crate::cli::args::ForgetArgs;
use crate::cli::CommandContext;
use crate::error::PcacheResult;
use crate::ui::{self, UiContext};

/// Execute the forget command
pub async fn execute(args: ForgetArgs, ctx: &CommandContext) -> PcacheResult<()> {
    let ui_ctx = UiContext::detect();
    let key = FileKey::new(&args.path)?;
    let root = ctx.open_root().await?;

    match root.index().invalidate(&key).await? {
        Some(entry) => {
            root.blocks().discard(&key, entry.generation).await;
            ui::step_ok_detail(
                &ui_ctx,
                &format!("Forgot {}", key),
                &ui::format_bytes(entry.ranges.cached_bytes()),
            );
        }
        None => ui::step_info(&ui_ctx, &format!("{} is not cached", key)),
    }

    root.close().await
}
