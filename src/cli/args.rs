//! Command-line argument surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// ZPAQ level 2 archiver.
#[derive(Debug, Parser)]
#[command(name = "zpaqr", version, about = "ZPAQ level 2 context-mixing archiver")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Print only errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print per-segment detail.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an archive from the listed files (one block per file).
    #[command(visible_alias = "c")]
    Create {
        /// Archive to write.
        archive: PathBuf,
        /// Files to add, in order. Directories are not traversed.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Compression level: 0 store, 1 fast, 2 mid, 3 max.
        #[arg(short = 'm', long = "method", default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=3))]
        level: u8,
        /// Do not store SHA-1 checksums in segment trailers.
        #[arg(long)]
        no_checksum: bool,
    },

    /// Extract every file in the archive.
    #[command(visible_alias = "x")]
    Extract {
        /// Archive to read.
        archive: PathBuf,
        /// Directory extracted files are written into.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Overwrite files that already exist.
        #[arg(short, long)]
        force: bool,
        /// Skip checksum verification.
        #[arg(long)]
        no_verify: bool,
        /// Decode blocks in parallel with this many threads (0 = all cores).
        #[cfg(feature = "multithread")]
        #[arg(short = 't', long, default_value_t = 0)]
        threads: usize,
    },

    /// List blocks and segments without decoding.
    #[command(visible_alias = "l")]
    List {
        /// Archive to read.
        archive: PathBuf,
    },
}
