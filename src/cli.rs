//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Mirror remote content to local storage.
///
/// Data Cloner pages through each enabled source, stores every recognized
/// item with a JSON metadata sidecar, and, when retirement is enabled for a
/// source, deletes the remote copy once the local one is confirmed on disk.
///
/// Values not given on the command line come from the config file.
#[derive(Parser, Debug)]
#[command(name = "data-cloner")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Config file path (default: $XDG_CONFIG_HOME/data-cloner/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Destination root directory
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Only run these sources (repeatable; each must be enabled in config)
    #[arg(short = 's', long = "source", value_name = "NAME")]
    pub sources: Vec<String>,

    /// Never delete remote copies, regardless of config
    #[arg(long)]
    pub no_retire: bool,

    /// Minimum delay between outbound calls in milliseconds (0 to disable, max 60000)
    #[arg(short = 'l', long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub rate_limit: Option<u64>,

    /// Maximum listing pages fetched per source (1-10000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=10000))]
    pub max_pages: Option<u64>,

    /// Maximum retry attempts for transient page failures (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,
}
