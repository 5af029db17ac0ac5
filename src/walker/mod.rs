//! Local filesystem crawler
//!
//! This module implements a single-threaded, depth-first directory crawler
//! that commits one inventory record per entry as it goes.
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │        Crawler          │
//!                     │  - explicit dir stack   │
//!                     │  - read_dir streaming   │
//!                     └───────────┬─────────────┘
//!                                 │
//!            ┌────────────────────┼────────────────────┐
//!            │                    │                    │
//!      ┌─────▼─────┐        ┌─────▼─────┐        ┌─────▼─────┐
//!      │   stat    │        │  digest   │        │  commit   │
//!      │ (lstat /  │        │ (blake3,  │        │ (SQLite,  │
//!      │  follow)  │        │  chunked) │        │ 1 tx/row) │
//!      └───────────┘        └───────────┘        └───────────┘
//! ```

pub mod crawler;

pub use crawler::{CrawlOptions, CrawlOutcome, CrawlStats, Crawler};
