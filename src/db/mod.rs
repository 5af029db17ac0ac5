//! SQLite storage for the inventory
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Crawler                           │
//! │  - one call per directory / file                     │
//! └─────────────────────┬───────────────────────────────┘
//!                       │ create_directory / create_file
//!                       ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                 InventoryStore                       │
//! │  - sanitizes names                                   │
//! │  - assigns per-run serials                           │
//! │  - one transaction per record, committed at once     │
//! └─────────────────────┬───────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────────────┐
//! │        SQLite (job / directory / file, WAL)          │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod report;
pub mod schema;
pub mod store;

pub use report::{list_jobs, size_histogram, unterminated_jobs, JobSummary, SizeBucket};
pub use schema::{configure_connection, create_schema, drop_schema, schema_version, SCHEMA_VERSION};
pub use store::{InventoryStore, JobRecord, SerialCounter};
