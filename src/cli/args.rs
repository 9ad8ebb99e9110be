//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// pcache - persistent read cache for slow filesystems
///
/// Reads files from a backing directory through a local cache that keeps
/// every byte range it has seen, across restarts.
#[derive(Parser, Debug)]
#[command(name = "pcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "PCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache root directory (overrides config)
    #[arg(long, global = true, env = "PCACHE_CACHE_ROOT")]
    pub cache_root: Option<PathBuf>,

    /// Backing source directory (overrides config)
    #[arg(long, global = true, env = "PCACHE_SOURCE")]
    pub source: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read a file range through the cache
    Read(ReadArgs),

    /// Pull whole files into the cache
    Warm(WarmArgs),

    /// List cached files and their coverage
    Status(StatusArgs),

    /// Drop everything cached for one file
    Forget(ForgetArgs),

    /// Delete the cache root
    Clear(ClearArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the read command
#[derive(Parser, Debug)]
pub struct ReadArgs {
    /// File path relative to the backing source
    pub path: String,

    /// Byte offset to start at
    #[arg(long, default_value = "0")]
    pub offset: u64,

    /// Number of bytes to read (defaults to the rest of the file)
    #[arg(long)]
    pub length: Option<u64>,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the warm command
#[derive(Parser, Debug)]
pub struct WarmArgs {
    /// File paths relative to the backing source
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Read size while warming, in KiB (default: from config)
    #[arg(long)]
    pub chunk_kb: Option<u64>,

    /// Files to warm concurrently (default: from config)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the forget command
#[derive(Parser, Debug)]
pub struct ForgetArgs {
    /// File path relative to the backing source
    pub path: String,
}

/// Arguments for the clear command
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for the status command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
