//! Database schema definitions and creation
//!
//! This module defines the SQLite schema for the inventory (`job`,
//! `directory`, `file`) and provides functions to create, configure and
//! reset it.

use crate::error::DbResult;
use rusqlite::Connection;

/// Current schema version, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: u32 = 1;

/// Maximum stored owner name width in bytes
pub const MAX_OWNER_LEN: usize = 20;

/// Maximum stored host name width in bytes
pub const MAX_HOST_LEN: usize = 20;

/// Maximum stored job comment width in bytes
pub const MAX_COMMENT_LEN: usize = 80;

/// SQL to create the job table
const CREATE_JOB_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS job (
    id INTEGER PRIMARY KEY,
    started TEXT NOT NULL,         -- RFC 3339, set at creation
    ended TEXT,                    -- NULL until the run completes
    owner VARCHAR(20),
    host VARCHAR(20),
    comment VARCHAR(80),
    hashing_enabled INTEGER NOT NULL DEFAULT 0
)
"#;

/// SQL to create the directory table
const CREATE_DIRECTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS directory (
    id INTEGER PRIMARY KEY,
    job_id INTEGER NOT NULL REFERENCES job(id) ON DELETE CASCADE,
    parent INTEGER REFERENCES directory(id) ON DELETE CASCADE,  -- NULL for a traversal root
    serial INTEGER NOT NULL,
    name VARCHAR(255) NOT NULL,
    ctime INTEGER,                 -- Unix timestamp
    mtime INTEGER,
    atime INTEGER,
    mode INTEGER,                  -- Type + permission bits
    size INTEGER,
    uid INTEGER,
    gid INTEGER
)
"#;

/// SQL to create the file table
const CREATE_FILE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS file (
    id INTEGER PRIMARY KEY,
    parent INTEGER NOT NULL REFERENCES directory(id) ON DELETE CASCADE,
    serial INTEGER NOT NULL,
    name VARCHAR(255) NOT NULL,
    ctime INTEGER,
    mtime INTEGER,
    atime INTEGER,
    mode INTEGER,
    size INTEGER,
    uid INTEGER,
    gid INTEGER,
    digest CHAR(32)                -- NULL unless hashing was requested and succeeded
)
"#;

/// Indexes are created up front: the store is queried while it grows
const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_directory_parent ON directory(parent)",
    "CREATE INDEX IF NOT EXISTS idx_directory_name ON directory(name)",
    "CREATE INDEX IF NOT EXISTS idx_directory_job ON directory(job_id)",
    "CREATE INDEX IF NOT EXISTS idx_file_parent ON file(parent)",
    "CREATE INDEX IF NOT EXISTS idx_file_name ON file(name)",
    "CREATE INDEX IF NOT EXISTS idx_file_digest ON file(digest) WHERE digest IS NOT NULL",
];

/// Tables in drop order (children first)
const TABLES_CHILDREN_FIRST: &[&str] = &["file", "directory", "job"];

/// Connection pragmas.
///
/// Every record is its own transaction, so WAL with NORMAL sync keeps each
/// commit cheap while surviving a crash of this process.
const CONNECTION_PRAGMAS: &str = r#"
PRAGMA foreign_keys = ON;
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;      -- 64MB cache
PRAGMA temp_store = MEMORY;
"#;

/// Busy timeout before a locked database counts as a failed commit
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Apply per-connection settings
pub fn configure_connection(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(CONNECTION_PRAGMAS)?;
    conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// Create tables and indexes if they do not exist yet
pub fn create_schema(conn: &Connection) -> DbResult<()> {
    conn.execute(CREATE_JOB_TABLE, [])?;
    conn.execute(CREATE_DIRECTORY_TABLE, [])?;
    conn.execute(CREATE_FILE_TABLE, [])?;

    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Drop every inventory table, losing all jobs
pub fn drop_schema(conn: &Connection) -> DbResult<()> {
    for table in TABLES_CHILDREN_FIRST {
        conn.execute(&format!("DROP TABLE IF EXISTS {}", table), [])?;
    }
    Ok(())
}

/// Read the stored schema version (0 for a fresh database)
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}
