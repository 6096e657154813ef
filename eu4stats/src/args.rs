use clap::{Parser, Subcommand, ValueEnum};
use eu4data::SnapshotDate;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the EU4 installation (default: $EU4_PATH, then Steam)
    #[arg(long, global = true)]
    pub game_path: Option<PathBuf>,

    /// JSON data configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// error, warn, info, debug or trace
    #[arg(long, global = true, default_value = "info")]
    pub log_level: log::LevelFilter,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum Format {
    Json,
    Text,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum EntityKind {
    Country,
    Province,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a single file and print it.
    Parse {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },

    /// Print the state of a country or province at a date as JSON.
    ///
    /// Example: `snapshot province Stockholm --date 1521.1.1`
    Snapshot {
        kind: EntityKind,
        /// Code (SWE, 1) or display name (Sweden, Stockholm).
        query: String,
        /// Y.M.D; defaults to the configured start date.
        #[arg(long)]
        date: Option<SnapshotDate>,
    },

    /// Tab-separated stats for every country owning provinces.
    Stats {
        #[arg(long)]
        date: Option<SnapshotDate>,
    },

    /// Idea costs for one tag or idea group, or totals for every group.
    Ideas { tag: Option<String> },
}
