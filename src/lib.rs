//! fs-inventory - Filesystem Inventory Crawler
//!
//! Records every directory and file under one or more roots into an SQLite
//! database, one committed row per entry, so the inventory of an enormous
//! tree can be queried while it is still being built and survives an
//! interrupted run.
//!
//! # Features
//!
//! - **Write-through persistence**: each directory is committed before any
//!   of its children, so parent references are always valid.
//!
//! - **Bounded memory**: listings are streamed and the traversal uses an
//!   explicit stack; memory grows with tree depth only.
//!
//! - **Optional content digests**: files are hashed in fixed-size chunks.
//!
//! - **Graceful interrupt**: Ctrl-C stops intake at the next entry; the job
//!   stays unterminated and everything committed so far is kept.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │ InventoryJob │────►│   Crawler    │────►│  InventoryStore  │
//! │  job row,    │     │  read_dir,   │     │  sanitize names, │
//! │  shutdown    │     │  stat, hash  │     │  serials, commit │
//! └──────────────┘     └──────────────┘     └────────┬─────────┘
//!                                                    │
//!                                                    ▼
//!                                         ┌──────────────────┐
//!                                         │    SQLite DB     │
//!                                         │ job / directory  │
//!                                         │ / file           │
//!                                         └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Inventory two trees with digests
//! fs-inventory /srv /home -m -o inventory.db -d "weekly"
//!
//! # Query results
//! sqlite3 inventory.db "SELECT name, size FROM file WHERE size > 1000000000"
//! ```

pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod job;
pub mod progress;
pub mod sanitize;
pub mod types;
pub mod walker;

pub use config::{CliArgs, InventoryConfig, ScanConfig};
pub use db::InventoryStore;
pub use error::{InventoryError, Result};
pub use job::{InventoryJob, JobReport};
pub use types::{DirectoryId, EntryStat, FileId, JobId, JobMetadata};
pub use walker::{CrawlOptions, CrawlOutcome, CrawlStats, Crawler};
