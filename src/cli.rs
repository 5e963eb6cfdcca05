//! Command-line interface definitions for newsharvest.
//!
//! Everything else lives in the YAML config file; the CLI only picks the file,
//! the producer and an optional backup path override.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Which producer feeds the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Mode {
    /// Walk the configured HTML feeds.
    #[default]
    Crawl,
    /// Read top posts from the aggregator channels.
    Aggregate,
    /// Replay links stored in the error table.
    Restore,
}

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Crawl, resuming from the backup named in the config
/// newsharvest -c harvest.yaml
///
/// # Replay failed links with a scratch backup
/// newsharvest -c harvest.yaml --mode restore --backup /tmp/restore.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, env = "NEWSHARVEST_CONFIG")]
    pub config: PathBuf,

    /// Producer to run
    #[arg(long, value_enum, default_value_t = Mode::Crawl)]
    pub mode: Mode,

    /// Override the backup file named in the config
    #[arg(short, long)]
    pub backup: Option<PathBuf>,
}
