//! Progress bars for warming files

use super::context::UiContext;
use super::output::format_bytes;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "  {spinner:.cyan} {prefix:30!} {bar:24.cyan/dim} {bytes}/{total_bytes} {bytes_per_sec:.dim}";

/// One bar per file being warmed, stacked; plain lines in CI
pub struct WarmProgress {
    multi: Option<MultiProgress>,
    style: ProgressStyle,
}

impl WarmProgress {
    pub fn new(ctx: &UiContext) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸─");
        Self {
            multi: ctx.use_fancy_output().then(MultiProgress::new),
            style,
        }
    }

    /// Start tracking one file
    pub fn file(&self, path: &str) -> FileProgress {
        let bar = self.multi.as_ref().map(|multi| {
            let bar = multi.add(ProgressBar::new(0));
            bar.set_style(self.style.clone());
            bar.set_prefix(path.to_string());
            bar
        });
        FileProgress {
            bar,
            path: path.to_string(),
        }
    }
}

/// Progress of a single file
pub struct FileProgress {
    bar: Option<ProgressBar>,
    path: String,
}

impl FileProgress {
    pub fn update(&self, done: u64, total: u64) {
        if let Some(bar) = &self.bar {
            bar.set_length(total);
            bar.set_position(done);
        }
    }

    pub fn finish(&self, size: u64) {
        match &self.bar {
            Some(bar) => bar.finish(),
            None => println!(
                "  {} {} ({})",
                style("[OK]").green(),
                self.path,
                format_bytes(size)
            ),
        }
    }

    pub fn fail(&self, reason: &str) {
        match &self.bar {
            Some(bar) => bar.abandon_with_message(format!("failed: {}", reason)),
            None => println!("  {} {}: {}", style("[FAIL]").red(), self.path, reason),
        }
    }
}
