//! updo - declarative application updates
//!
//! Keeps a directory of applications current with their upstream releases.
//!
//! # Overview
//!
//! Every application names exactly one upstream (a GitHub release or branch,
//! git tags, a scraped web page, a command's output, or a static URL). A run
//! resolves each upstream to a concrete artifact, downloads and unpacks it
//! into the managed root, and runs the configured build and deploy steps.
//! `purge` removes releases that are no longer current.
//!
//! Every command is a dry run unless `--commit` is given.
//!
//! # Directory Layout
//!
//! ```text
//! <directory>/
//! ├── .updo.lock               # PID of the running process
//! ├── .updo.update.index       # Left by a dry run with pending changes
//! ├── .updo.purge.index
//! └── <app>/
//!     ├── <hash>.<file>        # Downloaded archive
//!     └── <hash>.<app>.<tag>/  # Unpacked release
//! ```

#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod cmd;
pub mod ui;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "updo")]
#[command(author, version, about = "updo - declarative application updates")]
pub struct Cli {
    /// Configuration file [default: $XDG_CONFIG_HOME/updo/config.toml]
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Only process these applications (comma separated)
    #[arg(short, long, global = true, value_delimiter = ',')]
    pub applications: Vec<String>,

    /// Skip these applications (comma separated)
    #[arg(short, long, global = true, value_delimiter = ',')]
    pub disable: Vec<String>,

    /// Log level; overrides RUST_LOG
    #[arg(short, long, global = true)]
    pub verbosity: Option<Verbosity>,

    /// Apply changes; without this every command is a dry run
    #[arg(long, global = true)]
    pub commit: bool,

    /// Token for the GitHub API
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install or update applications to their latest upstream release
    Upgrade,
    /// Remove stale releases and orphaned directories
    Purge,
    /// Print version information
    Version,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Verbosity {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Verbosity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}
