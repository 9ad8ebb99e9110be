//! Clear command - delete the whole cache root

use crate::cache::CacheRoot;
use crate::cli::args::ClearArgs;
use crate::cli::CommandContext;
use crate::error::PcacheResult;
use crate::ui::{self, UiContext};

/// Execute the clear command
pub async fn execute(args: ClearArgs, ctx: &CommandContext) -> PcacheResult<()> {
    let ui_ctx = UiContext::detect().with_auto_yes(args.yes);
    let root = ctx.cache_root();

    if !root.exists() {
        ui::step_info(&ui_ctx, &format!("No cache at {}", root.display()));
        return Ok(());
    }

    let question = format!("Delete everything cached in {}?", root.display());
    if !ui::confirm(&ui_ctx, &question, false).await? {
        ui::step_warn_hint(&ui_ctx, "Nothing deleted", "Use --yes to skip confirmation");
        return Ok(());
    }

    CacheRoot::clear(root).await?;
    ui::step_ok_detail(&ui_ctx, "Cache cleared", &root.display().to_string());
    Ok(())
}
