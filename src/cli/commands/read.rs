//! Read command - stream a file range through the cache

use crate::cache::FileKey;
use crate::cli::args::ReadArgs;
use crate::cli::CommandContext;
use crate::error::{PcacheError, PcacheResult};
use tokio::fs;
use tokio::io::{self, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Largest single read issued while streaming
const STREAM_CHUNK: u64 = 4 * 1024 * 1024;

/// Execute the read command
pub async fn execute(args: ReadArgs, ctx: &CommandContext) -> PcacheResult<()> {
    let key = FileKey::new(&args.path)?;
    let engine = ctx.open_engine().await?;

    let mut out: Box<dyn AsyncWrite + Unpin + Send> = match &args.output {
        Some(path) => Box::new(
            fs::File::create(path)
                .await
                .map_err(|e| PcacheError::io(format!("creating {}", path.display()), e))?,
        ),
        None => Box::new(io::stdout()),
    };

    let mut offset = args.offset;
    let mut remaining = args.length.unwrap_or(u64::MAX);
    let mut written = 0u64;
    while remaining > 0 {
        let want = remaining.min(STREAM_CHUNK);
        let bytes = engine.serve_read(&key, offset, want).await?;
        if bytes.is_empty() {
            break;
        }
        out.write_all(&bytes)
            .await
            .map_err(|e| PcacheError::io("writing output", e))?;

        let got = bytes.len() as u64;
        offset += got;
        written += got;
        remaining -= got;
        if got < want {
            break;
        }
    }
    out.flush()
        .await
        .map_err(|e| PcacheError::io("flushing output", e))?;

    let stats = engine.stats();
    debug!(
        "Read {} bytes of {}: {} from cache, {} fetched in {} request(s)",
        written, key, stats.bytes_from_cache, stats.bytes_fetched, stats.backing_fetches
    );
    engine.close().await
}
