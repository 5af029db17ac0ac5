//! Error types for fs-inventory
//!
//! This module defines the error hierarchy:
//! - SQLite storage errors
//! - Configuration and CLI errors
//! - Per-entry crawl errors, which are logged and absorbed by the crawler
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Only storage setup and configuration errors reach the top level
//! - Every per-entry error carries the offending path

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for fs-inventory
#[derive(Error, Debug)]
pub enum InventoryError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors outside the crawl (e.g. resolving the working directory)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to open or create the database file
    #[error("Failed to open database at '{path}': {reason}")]
    Open { path: PathBuf, reason: String },

    /// Existing database cannot be used with this schema
    #[error("Database schema error: {0}")]
    Schema(String),

    /// No job row with this id
    #[error("Job {0} not found")]
    JobNotFound(i64),

    /// No directory row with this id
    #[error("Directory {0} not found")]
    DirectoryNotFound(i64),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Digest chunk size out of range
    #[error("Invalid chunk size {size}: must be between 1 and {max} bytes")]
    InvalidChunkSize { size: u64, max: u64 },

    /// Size string could not be parsed
    #[error("Invalid size value '{0}'")]
    InvalidSize(String),

    /// Nothing to scan
    #[error("No directories to scan")]
    NoRoots,

    /// Database path error
    #[error("Invalid database path '{path}': {reason}")]
    InvalidDatabasePath { path: PathBuf, reason: String },
}

/// A failure confined to a single filesystem entry.
///
/// None of these stop the crawl: the crawler logs them and moves on to the
/// next entry (or the next sibling subtree for [`EntryError::Unlistable`]).
#[derive(Error, Debug)]
pub enum EntryError {
    /// Entry disappeared between listing and stat
    #[error("No such file or directory '{}'", path.display())]
    Vanished { path: PathBuf },

    /// Directory could not be opened or read; its subtree is abandoned
    #[error("Can't read directory '{}': {source}", path.display())]
    Unlistable { path: PathBuf, source: io::Error },

    /// File content could not be read for hashing; digest stored as null
    #[error("Can't open '{}' for reading: {source}", path.display())]
    Unreadable { path: PathBuf, source: io::Error },

    /// Single-record commit failed and was rolled back
    #[error("Error committing '{}': {source}", path.display())]
    NotPersisted { path: PathBuf, source: DbError },

    /// Any other metadata failure
    #[error("Failed to stat '{}': {source}", path.display())]
    Stat { path: PathBuf, source: io::Error },
}

impl EntryError {
    /// Classify a metadata error: `NotFound` means the entry vanished
    pub fn from_stat(path: PathBuf, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            EntryError::Vanished { path }
        } else {
            EntryError::Stat { path, source }
        }
    }
}

/// Result type alias for InventoryError
pub type Result<T> = std::result::Result<T, InventoryError>;

/// Result type alias for DbError
pub type DbResult<T> = std::result::Result<T, DbError>;
