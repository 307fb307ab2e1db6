//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Watch torrent RSS feeds and admit matching releases into qBittorrent.
///
/// Tasks come from the database, seeded on startup from the `tasks` array of
/// the config file.
#[derive(Parser, Debug)]
#[command(name = "torrss")]
#[command(author, version, about)]
pub struct Args {
    /// JSON configuration file (defaults are used when omitted)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Run every active task once and exit instead of scheduling
    #[arg(long)]
    pub once: bool,

    /// Evaluate feeds and record history without touching the download client
    #[arg(long)]
    pub dry_run: bool,
}

impl Args {
    /// Default log filter when `RUST_LOG` is unset
    pub fn default_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}
