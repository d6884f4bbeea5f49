//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use specdl_core::download::DEFAULT_THREAD_COUNT;

/// Catalogue and bulk-download versioned specification documents.
///
/// Specdl loads the crawler's manifest of discovered documents, reduces it
/// to the latest version per specification family, and downloads the
/// selection into a release/series directory tree.
#[derive(Parser, Debug)]
#[command(name = "specdl")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Manifest of discovered documents produced by the crawler
    #[arg(short = 'm', long, default_value = "links.json")]
    pub manifest: PathBuf,

    /// Directory tree the downloads are written under
    #[arg(short = 'o', long, default_value = "By-Release")]
    pub output_dir: PathBuf,

    /// Number of parallel download workers (1-64)
    #[arg(short = 'T', long, default_value_t = DEFAULT_THREAD_COUNT as u8, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub threads: u8,

    /// Organize output by series instead of by release
    #[arg(short = 'S', long)]
    pub by_series: bool,

    /// Restrict the download to a single release number (e.g. -R 17)
    #[arg(short = 'R', long)]
    pub release: Option<u32>,

    /// Download every discovered version instead of only the latest per family
    #[arg(short = 'a', long)]
    pub all_versions: bool,

    /// Write the filtered manifest and exit without downloading
    #[arg(short = 'n', long)]
    pub no_download: bool,

    /// Restart partial files from scratch instead of resuming them
    #[arg(long)]
    pub no_resume: bool,
}
