//! Warm command - pull whole files into the cache

use crate::cache::{CacheEngine, FileKey};
use crate::cli::args::WarmArgs;
use crate::cli::CommandContext;
use crate::error::{PcacheError, PcacheResult};
use crate::ui::{self, UiContext, WarmProgress};
use futures_util::stream::{self, StreamExt};
use tracing::warn;

/// Execute the warm command
pub async fn execute(args: WarmArgs, ctx: &CommandContext) -> PcacheResult<()> {
    let ui_ctx = UiContext::detect();
    let chunk = args.chunk_kb.unwrap_or(ctx.config.warm.chunk_kb).max(1) * 1024;
    let jobs = args.jobs.unwrap_or(ctx.config.warm.jobs).max(1);

    // Reject malformed paths before touching the cache
    let keys = args
        .paths
        .iter()
        .map(|p| FileKey::new(p))
        .collect::<PcacheResult<Vec<_>>>()?;

    let engine = ctx.open_engine().await?;
    let progress = WarmProgress::new(&ui_ctx);
    let total = keys.len();

    let results: Vec<PcacheResult<u64>> = stream::iter(keys)
        .map(|key| warm_one(&engine, &progress, key, chunk))
        .buffer_unordered(jobs)
        .collect()
        .await;

    let failed = results.iter().filter(|r| r.is_err()).count();
    let stats = engine.stats();
    ui::key_value(&ui_ctx, "Fetched", &ui::format_bytes(stats.bytes_fetched));
    ui::key_value(&ui_ctx, "Already cached", &ui::format_bytes(stats.bytes_from_cache));
    engine.close().await?;

    if failed > 0 {
        return Err(PcacheError::User(format!(
            "{} of {} file(s) could not be warmed",
            failed, total
        )));
    }
    ui::outro_success(&ui_ctx, &format!("Warmed {} file(s)", total));
    Ok(())
}

async fn warm_one(
    engine: &CacheEngine,
    progress: &WarmProgress,
    key: FileKey,
    chunk: u64,
) -> PcacheResult<u64> {
    let bar = progress.file(key.as_str());
    match engine.warm(&key, chunk, |done, total| bar.update(done, total)).await {
        Ok(size) => {
            bar.finish(size);
            Ok(size)
        }
        Err(e) => {
            warn!("Warming {} failed: {}", key, e);
            bar.fail(&e.to_string());
            Err(e)
        }
    }
}
