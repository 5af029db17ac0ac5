//! Configuration types for fs-inventory
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Human-readable size parsing for the digest chunk size

use crate::content::DEFAULT_CHUNK_SIZE;
use crate::error::{ConfigError, Result};
use crate::types::JobMetadata;
use crate::walker::CrawlOptions;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Largest accepted digest chunk size (1 GiB)
pub const MAX_CHUNK_SIZE: u64 = 1024 * 1024 * 1024;

/// Default database file
pub const DEFAULT_DATABASE: &str = "inventory.db";

/// Filesystem inventory: record every directory and file under the given
/// roots into an SQLite database
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fs-inventory",
    version,
    about = "Record a filesystem tree into an SQLite inventory",
    long_about = "Walks one or more directory trees depth-first and records every directory \
                  and file (name, times, mode, size, owner, optional content digest) into an \
                  SQLite database. Each record is committed as soon as it is discovered, so an \
                  interrupted run keeps everything found so far.",
    after_help = "EXAMPLES:\n    \
        fs-inventory /srv/data -o data.db -d 'weekly scan'\n    \
        fs-inventory /home /opt -m -g 4MB\n    \
        fs-inventory report -o data.db\n    \
        fs-inventory path 42 -o data.db",
    args_conflicts_with_subcommands = true
)]
pub struct CliArgs {
    /// Directories to inventory (default: current directory)
    #[arg(value_name = "DIRECTORY")]
    pub directories: Vec<PathBuf>,

    /// Subcommand (report, path)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Output database file
    #[arg(short = 'o', long, default_value = DEFAULT_DATABASE, value_name = "FILE")]
    pub database: PathBuf,

    /// Free-text description stored with the job
    #[arg(short = 'd', long, value_name = "TEXT")]
    pub description: Option<String>,

    /// Owner recorded with the job (default: current user)
    #[arg(long, value_name = "NAME")]
    pub owner: Option<String>,

    /// Compute a content digest for every file
    #[arg(short = 'm', long)]
    pub digest: bool,

    /// Bytes read per chunk while hashing (suffixes KB, MB, GB)
    #[arg(short = 'g', long, value_name = "SIZE")]
    pub chunk_size: Option<String>,

    /// Drop and recreate all tables before scanning
    #[arg(short = 'n', long)]
    pub nuke: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log every SQL statement sent to the database
    #[arg(long)]
    pub sql_debug: bool,
}

/// Subcommands
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// List jobs and the file size distribution
    Report {
        /// Inventory database
        #[arg(short = 'o', long, default_value = DEFAULT_DATABASE, value_name = "FILE")]
        database: PathBuf,

        /// Restrict the size distribution to one job
        #[arg(long, value_name = "ID")]
        job: Option<i64>,

        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Print the full path of a stored directory
    Path {
        /// Directory id
        #[arg(value_name = "DIRECTORY_ID")]
        directory: i64,

        /// Inventory database
        #[arg(short = 'o', long, default_value = DEFAULT_DATABASE, value_name = "FILE")]
        database: PathBuf,
    },
}

/// What one inventory job scans and records
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// Roots, crawled in order
    pub roots: Vec<PathBuf>,

    /// Job row fields
    pub metadata: JobMetadata,

    /// Digest options
    pub crawl: CrawlOptions,
}

impl ScanConfig {
    /// Scan `roots` with default metadata and no digests
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ..Default::default()
        }
    }

    /// Enable content digests with the given chunk size
    pub fn with_digest(mut self, chunk_size: usize) -> Self {
        self.crawl.compute_digest = true;
        self.crawl.chunk_size = chunk_size;
        self.metadata.hashing_enabled = true;
        self
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct InventoryConfig {
    /// Job definition
    pub scan: ScanConfig,

    /// Output database path
    pub database_path: PathBuf,

    /// Drop existing tables first
    pub nuke: bool,

    /// Show progress indicator
    pub show_progress: bool,

    /// Trace SQL statements
    pub sql_debug: bool,
}

impl InventoryConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let roots = if args.directories.is_empty() {
            vec![std::env::current_dir()?]
        } else {
            args.directories
        };

        let chunk_size = match args.chunk_size.as_deref() {
            Some(s) => parse_size(s)?,
            None => DEFAULT_CHUNK_SIZE as u64,
        };
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidChunkSize {
                size: chunk_size,
                max: MAX_CHUNK_SIZE,
            }
            .into());
        }

        // Validate output path
        if let Some(parent) = args.database.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidDatabasePath {
                    path: args.database.clone(),
                    reason: format!("Parent directory '{}' does not exist", parent.display()),
                }
                .into());
            }
        }
        if args.database.is_dir() {
            return Err(ConfigError::InvalidDatabasePath {
                path: args.database.clone(),
                reason: "Is a directory".to_string(),
            }
            .into());
        }

        let metadata = JobMetadata {
            owner: args.owner.unwrap_or_else(whoami::username),
            host: local_hostname(),
            comment: args.description,
            hashing_enabled: args.digest,
        };

        let crawl = CrawlOptions {
            compute_digest: args.digest,
            chunk_size: chunk_size as usize,
        };

        Ok(Self {
            scan: ScanConfig {
                roots,
                metadata,
                crawl,
            },
            database_path: args.database,
            nuke: args.nuke,
            show_progress: !args.quiet,
            sql_debug: args.sql_debug,
        })
    }
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Parse a size string like "16MB", "512KB", "1GB" or "4096" into bytes
pub fn parse_size(s: &str) -> std::result::Result<u64, ConfigError> {
    let s = s.trim().to_uppercase();

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("GB") {
        (n, 1024u64 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, 1024u64 * 1024)
    } else if let Some(n) = s.strip_suffix("KB") {
        (n, 1024u64)
    } else if let Some(n) = s.strip_suffix('B') {
        (n, 1u64)
    } else {
        // Assume bytes if no suffix
        (s.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidSize(s.clone()))?;
    if !num.is_finite() || num < 0.0 {
        return Err(ConfigError::InvalidSize(s));
    }

    Ok((num * multiplier as f64) as u64)
}
