//! Write-through inventory store
//!
//! Every record is inserted in its own transaction and committed before the
//! call returns. A directory is therefore durable before any of its children
//! is created, which is what keeps the `parent` foreign keys satisfiable and
//! means an interrupted run never leaves a child pointing at an uncommitted
//! parent. The cost is one commit per row; the benefit is that no
//! uncommitted backlog ever builds up while scanning enormous trees.

use crate::db::schema::{self, MAX_COMMENT_LEN, MAX_HOST_LEN, MAX_OWNER_LEN};
use crate::error::{DbError, DbResult};
use crate::sanitize::{sanitize_dir_name, sanitize_file_name, truncate_to_width};
use crate::types::{DirectoryId, EntryStat, FileId, JobId, JobMetadata};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Per-run monotonic counter
///
/// Serials start at 1 and are never reused, even when the insert that
/// consumed one is rolled back.
#[derive(Debug, Clone, Default)]
pub struct SerialCounter {
    last: u64,
}

impl SerialCounter {
    /// Take the next serial
    pub fn next(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// Last serial handed out (0 if none)
    pub fn last(&self) -> u64 {
        self.last
    }

    fn reset(&mut self) {
        self.last = 0;
    }
}

/// A `job` row read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub id: JobId,
    pub started: String,
    pub ended: Option<String>,
    pub owner: Option<String>,
    pub host: Option<String>,
    pub comment: Option<String>,
    pub hashing_enabled: bool,
}

impl JobRecord {
    /// A job with no end timestamp was interrupted or crashed
    pub fn is_unterminated(&self) -> bool {
        self.ended.is_none()
    }
}

/// SQLite-backed persistence for jobs, directories and files
pub struct InventoryStore {
    conn: Connection,
    dir_serial: SerialCounter,
    file_serial: SerialCounter,
}

impl InventoryStore {
    /// Open (or create) the database file at `path`
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| DbError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> DbResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Configure an existing connection and make sure the schema exists
    ///
    /// A database stamped with a newer schema version is refused rather than
    /// written with an older layout.
    pub fn from_connection(conn: Connection) -> DbResult<Self> {
        schema::configure_connection(&conn)?;
        let version = schema::schema_version(&conn)?;
        if version > schema::SCHEMA_VERSION {
            return Err(DbError::Schema(format!(
                "database has schema version {}, this build supports up to {}",
                version,
                schema::SCHEMA_VERSION
            )));
        }
        schema::create_schema(&conn)?;

        Ok(Self {
            conn,
            dir_serial: SerialCounter::default(),
            file_serial: SerialCounter::default(),
        })
    }

    /// Underlying connection, for read-side queries
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Log every statement at debug level under the `fs_inventory::sql` target
    pub fn enable_sql_trace(&mut self) {
        self.conn.trace(Some(log_statement));
    }

    /// Drop and recreate all tables
    pub fn reset_schema(&mut self) -> DbResult<()> {
        schema::drop_schema(&self.conn)?;
        schema::create_schema(&self.conn)?;
        Ok(())
    }

    /// Insert and commit a new job; starts fresh serial sequences
    pub fn create_job(&mut self, meta: &JobMetadata) -> DbResult<JobId> {
        let started = chrono::Utc::now().to_rfc3339();
        let comment = meta
            .comment
            .as_deref()
            .map(|c| truncate_to_width(c, MAX_COMMENT_LEN));

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO job (started, ended, owner, host, comment, hashing_enabled)
             VALUES (?1, NULL, ?2, ?3, ?4, ?5)",
            params![
                started,
                truncate_to_width(&meta.owner, MAX_OWNER_LEN),
                truncate_to_width(&meta.host, MAX_HOST_LEN),
                comment,
                meta.hashing_enabled,
            ],
        )?;
        let id = JobId(tx.last_insert_rowid());
        tx.commit()?;

        self.dir_serial.reset();
        self.file_serial.reset();

        debug!(job = id.0, "Created job");
        Ok(id)
    }

    /// Stamp the job as completed. An end timestamp already set is kept.
    pub fn end_job(&mut self, job: JobId) -> DbResult<()> {
        let ended = chrono::Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE job SET ended = ?1 WHERE id = ?2 AND ended IS NULL",
            params![ended, job.0],
        )?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM job WHERE id = ?1)",
            [job.0],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(DbError::JobNotFound(job.0));
        }
        tx.commit()?;

        debug!(job = job.0, "Ended job");
        Ok(())
    }

    /// Insert and commit a directory record
    ///
    /// `raw_name` is the entry name, or the full root path for a traversal
    /// root (`parent == None`).
    pub fn create_directory(
        &mut self,
        job: JobId,
        parent: Option<DirectoryId>,
        raw_name: &[u8],
        stat: &EntryStat,
    ) -> DbResult<DirectoryId> {
        let name = sanitize_dir_name(raw_name);
        let serial = self.dir_serial.next();

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO directory (job_id, parent, serial, name, ctime, mtime, atime, mode, size, uid, gid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                job.0,
                parent.map(|p| p.0),
                serial as i64,
                name,
                stat.ctime,
                stat.mtime,
                stat.atime,
                stat.mode as i64,
                stat.size as i64,
                stat.uid as i64,
                stat.gid as i64,
            ],
        )?;
        let id = DirectoryId(tx.last_insert_rowid());
        tx.commit()?;

        Ok(id)
    }

    /// Insert and commit a file record
    ///
    /// On failure the transaction is rolled back (dropped) so only this one
    /// record is lost.
    pub fn create_file(
        &mut self,
        parent: DirectoryId,
        raw_name: &[u8],
        stat: &EntryStat,
        digest: Option<&str>,
    ) -> DbResult<FileId> {
        let name = sanitize_file_name(raw_name);
        let serial = self.file_serial.next();

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO file (parent, serial, name, ctime, mtime, atime, mode, size, uid, gid, digest)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                parent.0,
                serial as i64,
                name,
                stat.ctime,
                stat.mtime,
                stat.atime,
                stat.mode as i64,
                stat.size as i64,
                stat.uid as i64,
                stat.gid as i64,
                digest,
            ],
        )?;
        let id = FileId(tx.last_insert_rowid());
        tx.commit()?;

        Ok(id)
    }

    /// Rebuild the path of a directory from its parent chain
    ///
    /// The root's stored name is the root path it was scanned under, so the
    /// result is `root/child/.../leaf`.
    pub fn resolve_path(&self, dir: DirectoryId) -> DbResult<String> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT parent, name FROM directory WHERE id = ?1")?;

        let mut names = Vec::new();
        let mut current = Some(dir.0);
        while let Some(id) = current {
            let (parent, name): (Option<i64>, String) = stmt
                .query_row([id], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?
                .ok_or(DbError::DirectoryNotFound(id))?;
            names.push(name);
            current = parent;
        }

        let mut path = PathBuf::new();
        for name in names.iter().rev() {
            path.push(name);
        }
        Ok(path.to_string_lossy().into_owned())
    }

    /// Read a job row back
    pub fn job(&self, job: JobId) -> DbResult<Option<JobRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, started, ended, owner, host, comment, hashing_enabled FROM job WHERE id = ?1",
                [job.0],
                |row| {
                    Ok(JobRecord {
                        id: JobId(row.get(0)?),
                        started: row.get(1)?,
                        ended: row.get(2)?,
                        owner: row.get(3)?,
                        host: row.get(4)?,
                        comment: row.get(5)?,
                        hashing_enabled: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Serials handed out so far in the current run: (directories, files)
    pub fn serials(&self) -> (u64, u64) {
        (self.dir_serial.last(), self.file_serial.last())
    }
}

fn log_statement(sql: &str) {
    debug!(target: "fs_inventory::sql", "{}", sql);
}
