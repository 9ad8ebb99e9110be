//! Status command - list cached files and their coverage

use crate::cache::{CacheRoot, FileCacheEntry};
use crate::cli::args::{OutputFormat, StatusArgs};
use crate::cli::CommandContext;
use crate::error::PcacheResult;
use crate::ui::{self, UiContext};
use chrono::{DateTime, Utc};
use console::style;
use serde::Serialize;

/// One cached file, as reported by `status`
#[derive(Debug, Serialize)]
struct StatusRow {
    path: String,
    size: u64,
    cached: u64,
    coverage: f64,
    ranges: usize,
    generation: u64,
    updated_at: DateTime<Utc>,
}

impl From<&FileCacheEntry> for StatusRow {
    fn from(entry: &FileCacheEntry) -> Self {
        Self {
            path: entry.key.to_string(),
            size: entry.size,
            cached: entry.ranges.cached_bytes(),
            coverage: entry.coverage(),
            ranges: entry.ranges.intervals().len(),
            generation: entry.generation,
            updated_at: entry.updated_at,
        }
    }
}

/// Execute the status command
pub async fn execute(args: StatusArgs, ctx: &CommandContext) -> PcacheResult<()> {
    let root = ctx.open_root().await?;
    let rows: Vec<StatusRow> = root.index().entries().iter().map(StatusRow::from).collect();

    match args.format {
        OutputFormat::Table => print_table(&root, &rows).await?,
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Plain => print_plain(&rows),
    }

    root.close().await
}

async fn print_table(root: &CacheRoot, rows: &[StatusRow]) -> PcacheResult<()> {
    let ui_ctx = UiContext::detect();
    ui::intro(&ui_ctx, "pcache");
    ui::key_value(&ui_ctx, "Cache root", &root.path().display().to_string());
    ui::key_value(
        &ui_ctx,
        "Disk usage",
        &ui::format_bytes(root.blocks().disk_usage().await?),
    );

    if rows.is_empty() {
        ui::step_info(&ui_ctx, "Nothing cached yet");
        return Ok(());
    }

    println!();
    println!(
        "{:<40} {:>10} {:>10} {:>7} {:>6}  {:<16}",
        style("PATH").bold(),
        style("SIZE").bold(),
        style("CACHED").bold(),
        style("COVER").bold(),
        style("RANGES").bold(),
        style("UPDATED").bold()
    );
    println!("{}", "-".repeat(95));

    for row in rows {
        let percent = format!("{:.0}%", row.coverage * 100.0);
        let coverage = if row.cached >= row.size {
            style(percent).green()
        } else {
            style(percent).yellow()
        };
        println!(
            "{:<40} {:>10} {:>10} {:>7} {:>6}  {:<16}",
            truncate_path(&row.path, 40),
            ui::format_bytes(row.size),
            ui::format_bytes(row.cached),
            coverage,
            row.ranges,
            row.updated_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!();
    println!("{} file(s)", rows.len());
    Ok(())
}

fn print_plain(rows: &[StatusRow]) {
    for row in rows {
        println!("{}\t{}\t{}", row.path, row.cached, row.size);
    }
}

/// Keep the tail of long paths, which is the part that identifies the file
fn truncate_path(path: &str, width: usize) -> String {
    let count = path.chars().count();
    if count <= width {
        return path.to_string();
    }
    let tail: String = path.chars().skip(count - (width - 3)).collect();
    format!("...{}", tail)
}
