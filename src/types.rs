//! Record identities and entry metadata
//!
//! These types carry filesystem metadata from the crawler into the store.

use std::fmt;
use std::fs::Metadata;

/// Identity of a `job` row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub i64);

/// Identity of a `directory` row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirectoryId(pub i64);

/// Identity of a `file` row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DirectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata for a filesystem entry, as stored in `directory` and `file` rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryStat {
    /// Status change time (Unix timestamp)
    pub ctime: Option<i64>,

    /// Last modification time (Unix timestamp)
    pub mtime: Option<i64>,

    /// Last access time (Unix timestamp)
    pub atime: Option<i64>,

    /// File mode (type + permissions)
    pub mode: u32,

    /// Size in bytes
    pub size: u64,

    /// User ID
    pub uid: u32,

    /// Group ID
    pub gid: u32,
}

impl EntryStat {
    /// Capture the stored fields from `std::fs` metadata
    #[cfg(unix)]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            ctime: Some(meta.ctime()),
            mtime: Some(meta.mtime()),
            atime: Some(meta.atime()),
            mode: meta.mode(),
            size: meta.size(),
            uid: meta.uid(),
            gid: meta.gid(),
        }
    }

    /// Capture the stored fields from `std::fs` metadata
    #[cfg(not(unix))]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};

        fn unix_secs(t: std::io::Result<SystemTime>) -> Option<i64> {
            t.ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
        }

        let mode = if meta.permissions().readonly() { 0o444 } else { 0o644 };
        Self {
            ctime: unix_secs(meta.created()),
            mtime: unix_secs(meta.modified()),
            atime: unix_secs(meta.accessed()),
            mode,
            size: meta.len(),
            uid: 0,
            gid: 0,
        }
    }
}

/// Descriptive fields of a `job` row supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobMetadata {
    /// User running the inventory
    pub owner: String,

    /// Host the inventory runs on
    pub host: String,

    /// Free-text description
    pub comment: Option<String>,

    /// Whether content digests were requested
    pub hashing_enabled: bool,
}
