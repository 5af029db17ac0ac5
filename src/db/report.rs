//! Read-side queries over a finished (or interrupted) inventory
//!
//! These run on the same connection the crawler writes through, so they
//! see every committed record, including those of unterminated jobs.

use crate::error::DbResult;
use crate::types::JobId;
use rusqlite::{params, Connection};
use serde::Serialize;

/// One row of the job listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub id: i64,
    pub started: String,
    pub ended: Option<String>,
    pub owner: Option<String>,
    pub host: Option<String>,
    pub comment: Option<String>,
    pub hashing_enabled: bool,
    pub directories: u64,
    pub files: u64,
    pub bytes: u64,
}

impl JobSummary {
    /// "completed" when an end timestamp is set, otherwise "unterminated"
    pub fn status(&self) -> &'static str {
        if self.ended.is_some() {
            "completed"
        } else {
            "unterminated"
        }
    }
}

/// Number of files whose size rounds to `mib` mebibytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeBucket {
    pub mib: u64,
    pub files: u64,
}

/// List every job with its directory/file totals, oldest first
pub fn list_jobs(conn: &Connection) -> DbResult<Vec<JobSummary>> {
    let mut stmt = conn.prepare(
        "SELECT j.id, j.started, j.ended, j.owner, j.host, j.comment, j.hashing_enabled,
                (SELECT COUNT(*) FROM directory d WHERE d.job_id = j.id),
                (SELECT COUNT(*) FROM file f JOIN directory d ON f.parent = d.id WHERE d.job_id = j.id),
                (SELECT COALESCE(SUM(f.size), 0) FROM file f JOIN directory d ON f.parent = d.id WHERE d.job_id = j.id)
         FROM job j
         ORDER BY j.id",
    )?;

    let jobs = stmt
        .query_map([], |row| {
            Ok(JobSummary {
                id: row.get(0)?,
                started: row.get(1)?,
                ended: row.get(2)?,
                owner: row.get(3)?,
                host: row.get(4)?,
                comment: row.get(5)?,
                hashing_enabled: row.get(6)?,
                directories: row.get::<_, i64>(7)? as u64,
                files: row.get::<_, i64>(8)? as u64,
                bytes: row.get::<_, i64>(9)? as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(jobs)
}

/// Count files by size rounded to the nearest MiB, optionally for one job
pub fn size_histogram(conn: &Connection, job: Option<JobId>) -> DbResult<Vec<SizeBucket>> {
    let mut stmt = conn.prepare(
        "SELECT CAST(ROUND(f.size / 1048576.0) AS INTEGER) AS mib, COUNT(f.id)
         FROM file f JOIN directory d ON f.parent = d.id
         WHERE ?1 IS NULL OR d.job_id = ?1
         GROUP BY mib
         ORDER BY mib",
    )?;

    let buckets = stmt
        .query_map(params![job.map(|j| j.0)], |row| {
            Ok(SizeBucket {
                mib: row.get::<_, i64>(0)? as u64,
                files: row.get::<_, i64>(1)? as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(buckets)
}

/// Jobs whose end timestamp is still null
pub fn unterminated_jobs(conn: &Connection) -> DbResult<Vec<JobId>> {
    let mut stmt = conn.prepare("SELECT id FROM job WHERE ended IS NULL ORDER BY id")?;
    let ids = stmt
        .query_map([], |row| row.get(0).map(JobId))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}
