// SPDX-License-Identifier: AGPL-3.0-or-later
//! VFA CLI
//!
//! Browse and manipulate local files, the in-memory store and the inside of
//! tar archives through one set of commands.

mod commands;
mod config;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use vfa_core::SortCriterion;

#[derive(Parser)]
#[command(name = "vfa")]
#[command(author, version, about = "Virtual file access across disks and archives", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortBy {
    Name,
    Size,
    Date,
    Ext,
    Perm,
    Owner,
    Group,
}

impl From<SortBy> for SortCriterion {
    fn from(sort: SortBy) -> Self {
        match sort {
            SortBy::Name => SortCriterion::Name,
            SortBy::Size => SortCriterion::Size,
            SortBy::Date => SortCriterion::Date,
            SortBy::Ext => SortCriterion::Extension,
            SortBy::Perm => SortCriterion::Permissions,
            SortBy::Owner => SortCriterion::Owner,
            SortBy::Group => SortCriterion::Group,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List directory or archive contents
    #[command(alias = "dir")]
    Ls {
        /// Path to list (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Long format with details
        #[arg(short, long)]
        long: bool,

        /// Sort key
        #[arg(short, long, value_enum, default_value = "name")]
        sort: SortBy,

        /// Reverse the order
        #[arg(long)]
        desc: bool,

        /// List directories before files
        #[arg(long)]
        dirs_first: bool,
    },

    /// Display file contents
    Cat {
        /// File to display
        path: String,
    },

    /// Copy files or directories
    Cp {
        /// Source path
        source: String,

        /// Destination path
        dest: String,

        /// Force overwrite existing files
        #[arg(short, long)]
        force: bool,
    },

    /// Move or rename files
    Mv {
        /// Source path
        source: String,

        /// Destination path
        dest: String,

        /// Force overwrite existing files
        #[arg(short, long)]
        force: bool,
    },

    /// Remove files or empty directories
    Rm {
        /// Path(s) to remove
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Create directories
    Mkdir {
        /// Directory path(s) to create
        #[arg(required = true)]
        paths: Vec<String>,

        /// Create parent directories as needed
        #[arg(short, long)]
        parents: bool,
    },

    /// Show file or directory information
    Stat {
        /// Path to inspect
        path: String,
    },

    /// Print a content digest
    Checksum {
        /// File to digest
        path: String,

        /// Algorithm (MD5, SHA-1, SHA-256, SHA-384, SHA-512, CRC32, Adler32, BLAKE3)
        #[arg(short, long)]
        algorithm: Option<String>,
    },

    /// Show which operations a path supports
    Caps {
        /// Path to inspect
        path: String,
    },

    /// Show storage space information
    Df {
        /// Any path on the volume to query
        #[arg(default_value = ".")]
        path: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = match config::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(2);
        }
    };
    let vfs = vfa_providers::default_vfs(settings);

    let result = match cli.command {
        Commands::Ls { path, long, sort, desc, dirs_first } => {
            commands::ls(&vfs, &path, long, sort.into(), desc, dirs_first)
        }
        Commands::Cat { path } => commands::cat(&vfs, &path),
        Commands::Cp { source, dest, force } => commands::cp(&vfs, &source, &dest, force),
        Commands::Mv { source, dest, force } => commands::mv(&vfs, &source, &dest, force),
        Commands::Rm { paths } => commands::rm(&vfs, &paths),
        Commands::Mkdir { paths, parents } => commands::mkdir(&vfs, &paths, parents),
        Commands::Stat { path } => commands::stat(&vfs, &path),
        Commands::Checksum { path, algorithm } => {
            commands::checksum(&vfs, &path, algorithm.as_deref())
        }
        Commands::Caps { path } => commands::caps(&vfs, &path),
        Commands::Df { path } => commands::df(&vfs, &path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
