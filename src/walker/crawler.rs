//! Depth-first crawler with write-through persistence
//!
//! The crawler walks one root at a time on the calling thread:
//!
//! ```text
//! stack of open directories (path, id, read_dir handle)
//! │
//! ├── top: next entry ──► directory? ─► commit record ─► read_dir ─► push
//! │                  └──► file?      ─► stat ─► (digest) ─► commit record
//! └── exhausted or unreadable ─► pop
//! ```
//!
//! A directory's record is committed before its listing is even opened, so
//! every child row references a parent that is already durable. Listings are
//! streamed one entry at a time; a directory with millions of entries is
//! never held in memory. The stack replaces recursion, so tree depth is
//! bounded by open file handles rather than by the call stack.
//!
//! Every frame keeps its listing open until it is exhausted, so one crawl
//! holds as many directory handles as the current depth. A tree deeper than
//! the process's open-file limit (`ulimit -n`, often 1024) cannot be listed
//! past that depth: those subtrees are logged as unlistable with a message
//! naming the limit, and their directory records stay committed.
//!
//! Hashing a large file checks the shutdown flag between chunks. A file
//! whose digest is abandoned that way is not recorded.
//!
//! Failures on a single entry are logged with the path and absorbed here.

use crate::content::{ContentHasher, DEFAULT_CHUNK_SIZE};
use crate::db::InventoryStore;
use crate::error::EntryError;
use crate::sanitize::name_bytes;
use crate::types::{DirectoryId, EntryStat, JobId};
use std::fs::{self, DirEntry, Metadata, ReadDir};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How a crawl of one root ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Every reachable entry was visited (some may have been skipped)
    Completed,
    /// The shutdown flag was raised; intake stopped at an entry boundary
    Interrupted,
}

/// Crawl behaviour switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOptions {
    /// Compute a content digest for every file
    pub compute_digest: bool,
    /// Bytes read per chunk while hashing
    pub chunk_size: usize,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            compute_digest: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Counters accumulated over every root crawled by one [`Crawler`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub dirs: u64,
    pub files: u64,
    pub bytes: u64,
    pub digests: u64,
    /// Entries left out by policy, such as special files
    pub skipped: u64,
    pub vanished: u64,
    pub stat_failures: u64,
    pub unlistable: u64,
    pub unreadable: u64,
    pub unpersisted: u64,
}

impl CrawlStats {
    /// Records committed so far
    pub fn records(&self) -> u64 {
        self.dirs + self.files
    }

    /// Entries that hit an error of any kind
    pub fn errors(&self) -> u64 {
        self.vanished + self.stat_failures + self.unlistable + self.unreadable + self.unpersisted
    }
}

/// `EMFILE`: the process has no file descriptors left
#[cfg(unix)]
const EMFILE: i32 = 24;

/// Whether opening a listing failed because too many handles are open
fn is_handle_exhaustion(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(EMFILE)
    }
    #[cfg(not(unix))]
    {
        let _ = err;
        false
    }
}

/// An open directory on the traversal stack
struct DirFrame {
    path: PathBuf,
    id: DirectoryId,
    entries: ReadDir,
}

/// Single-threaded depth-first crawler writing through an [`InventoryStore`]
pub struct Crawler<'a> {
    store: &'a mut InventoryStore,
    job: JobId,
    hasher: Option<ContentHasher>,
    shutdown: Arc<AtomicBool>,
    stats: CrawlStats,
    progress: Option<Box<dyn FnMut(&CrawlStats) + 'a>>,
}

impl<'a> Crawler<'a> {
    pub fn new(
        store: &'a mut InventoryStore,
        job: JobId,
        options: &CrawlOptions,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let hasher = options
            .compute_digest
            .then(|| ContentHasher::new(options.chunk_size).with_cancel(Arc::clone(&shutdown)));

        Self {
            store,
            job,
            hasher,
            shutdown,
            stats: CrawlStats::default(),
            progress: None,
        }
    }

    /// Call `callback` after every committed record
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&CrawlStats) + 'a,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    pub fn into_stats(self) -> CrawlStats {
        self.stats
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Inventory the tree under `root`
    ///
    /// A root that is not a directory is logged and skipped without creating
    /// a record. The root's record stores the path as given.
    pub fn crawl(&mut self, root: &Path) -> CrawlOutcome {
        if self.is_cancelled() {
            return CrawlOutcome::Interrupted;
        }

        let meta = match fs::metadata(root) {
            Ok(meta) if meta.is_dir() => meta,
            Ok(_) => {
                warn!("{} is not a directory.", root.display());
                self.stats.skipped += 1;
                return CrawlOutcome::Completed;
            }
            Err(e) => {
                warn!("{} is not a directory: {}", root.display(), e);
                self.stats.skipped += 1;
                return CrawlOutcome::Completed;
            }
        };

        info!("Processing directory {}", root.display());
        let Some(root_id) = self.persist_directory(None, root, &name_bytes(root.as_os_str()), &meta)
        else {
            return CrawlOutcome::Completed;
        };

        let mut stack: Vec<DirFrame> = Vec::new();
        if let Some(frame) = self.open_dir(root.to_path_buf(), root_id, 0) {
            stack.push(frame);
        }

        loop {
            let open_dirs = stack.len();
            let Some(frame) = stack.last_mut() else {
                break;
            };
            if self.is_cancelled() {
                info!(
                    "Stopping crawl of {} at {}",
                    root.display(),
                    frame.path.display()
                );
                return CrawlOutcome::Interrupted;
            }

            let parent = frame.id;
            match frame.entries.next() {
                None => {
                    stack.pop();
                }
                Some(Err(source)) => {
                    // Listing broke part-way: abandon the rest of this directory only
                    if let Some(frame) = stack.pop() {
                        self.record(EntryError::Unlistable {
                            path: frame.path,
                            source,
                        });
                    }
                }
                Some(Ok(entry)) => {
                    if let Some(child) = self.visit(parent, &entry, open_dirs) {
                        stack.push(child);
                    }
                }
            }
        }

        CrawlOutcome::Completed
    }

    /// Handle one listed entry; returns a frame to descend into for directories
    ///
    /// `open_dirs` is the number of listings currently held open above it.
    fn visit(&mut self, parent: DirectoryId, entry: &DirEntry, open_dirs: usize) -> Option<DirFrame> {
        let path = entry.path();
        let name = entry.file_name();

        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(e) => {
                self.record(EntryError::from_stat(path, e));
                return None;
            }
        };

        if file_type.is_dir() {
            let meta = match fs::symlink_metadata(&path) {
                Ok(meta) => meta,
                Err(e) => {
                    self.record(EntryError::from_stat(path, e));
                    return None;
                }
            };
            let id = self.persist_directory(Some(parent), &path, &name_bytes(&name), &meta)?;
            return self.open_dir(path, id, open_dirs);
        }

        let meta = if file_type.is_file() {
            entry.metadata()
        } else if file_type.is_symlink() {
            // Links are recorded as the file they point to; links to
            // directories are not followed so cycles cannot occur
            fs::metadata(&path)
        } else {
            debug!("Skipping special file {}", path.display());
            self.stats.skipped += 1;
            return None;
        };

        let meta = match meta {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => {
                debug!("Not following link {}", path.display());
                self.stats.skipped += 1;
                return None;
            }
            Err(e) => {
                self.record(EntryError::from_stat(path, e));
                return None;
            }
        };

        debug!("Processing file {}", path.display());
        self.persist_file(parent, &path, &name_bytes(&name), &meta);
        None
    }

    fn open_dir(&mut self, path: PathBuf, id: DirectoryId, open_dirs: usize) -> Option<DirFrame> {
        debug!("Listing directory {}", path.display());
        match fs::read_dir(&path) {
            Ok(entries) => Some(DirFrame { path, id, entries }),
            Err(source) if is_handle_exhaustion(&source) => {
                self.stats.unlistable += 1;
                error!(
                    open_dirs,
                    "Open file limit reached, skipping subtree of '{}' (raise `ulimit -n` for deeper trees): {}",
                    path.display(),
                    source
                );
                None
            }
            Err(source) => {
                self.record(EntryError::Unlistable { path, source });
                None
            }
        }
    }

    fn persist_directory(
        &mut self,
        parent: Option<DirectoryId>,
        path: &Path,
        raw_name: &[u8],
        meta: &Metadata,
    ) -> Option<DirectoryId> {
        let stat = EntryStat::from_metadata(meta);
        match self.store.create_directory(self.job, parent, raw_name, &stat) {
            Ok(id) => {
                self.stats.dirs += 1;
                self.report_progress();
                Some(id)
            }
            Err(source) => {
                // Without a committed parent the subtree cannot be recorded
                self.record(EntryError::NotPersisted {
                    path: path.to_path_buf(),
                    source,
                });
                None
            }
        }
    }

    fn persist_file(&mut self, parent: DirectoryId, path: &Path, raw_name: &[u8], meta: &Metadata) {
        let stat = EntryStat::from_metadata(meta);

        let digest = match self.hasher.as_mut().map(|h| h.digest_file(path)) {
            None => None,
            Some(Ok(digest)) => Some(digest),
            Some(Err(_)) if self.is_cancelled() => {
                info!("Digest of {} abandoned on shutdown", path.display());
                return;
            }
            Some(Err(source)) => {
                self.record(EntryError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                });
                None
            }
        };

        match self
            .store
            .create_file(parent, raw_name, &stat, digest.as_deref())
        {
            Ok(_) => {
                self.stats.files += 1;
                self.stats.bytes += stat.size;
                if digest.is_some() {
                    self.stats.digests += 1;
                }
                self.report_progress();
            }
            Err(source) => self.record(EntryError::NotPersisted {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Log and count a per-entry failure
    fn record(&mut self, err: EntryError) {
        match &err {
            EntryError::Vanished { .. } => {
                self.stats.vanished += 1;
                warn!("{}", err);
            }
            EntryError::Stat { .. } => {
                self.stats.stat_failures += 1;
                warn!("{}", err);
            }
            EntryError::Unlistable { .. } => {
                self.stats.unlistable += 1;
                error!("{}", err);
            }
            EntryError::Unreadable { .. } => {
                self.stats.unreadable += 1;
                error!("{}", err);
            }
            EntryError::NotPersisted { .. } => {
                self.stats.unpersisted += 1;
                error!("{}", err);
            }
        }
    }

    fn report_progress(&mut self) {
        if let Some(progress) = self.progress.as_mut() {
            progress(&self.stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::digest_bytes;
    use crate::types::JobMetadata;
    use tempfile::{tempdir, TempDir};

    fn store_with_job() -> (InventoryStore, JobId) {
        let mut store = InventoryStore::open_in_memory().unwrap();
        let job = store.create_job(&JobMetadata::default()).unwrap();
        (store, job)
    }

    fn count(store: &InventoryStore, table: &str) -> i64 {
        store
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }

    fn file_names(store: &InventoryStore) -> Vec<String> {
        let mut names: Vec<String> = store
            .connection()
            .prepare("SELECT name FROM file")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        names.sort();
        names
    }

    fn flat_tree(names: &[&str]) -> TempDir {
        let dir = tempdir().unwrap();
        for name in names {
            fs::write(dir.path().join(name), name.as_bytes()).unwrap();
        }
        dir
    }

    #[test]
    fn test_crawl_stats_totals() {
        let stats = CrawlStats {
            dirs: 2,
            files: 3,
            vanished: 1,
            unpersisted: 2,
            ..Default::default()
        };
        assert_eq!(stats.records(), 5);
        assert_eq!(stats.errors(), 3);
    }

    #[test]
    fn test_root_not_a_directory() {
        let dir = flat_tree(&["plain.txt"]);
        let (mut store, job) = store_with_job();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut crawler = Crawler::new(&mut store, job, &CrawlOptions::default(), shutdown);
        assert_eq!(crawler.crawl(&dir.path().join("plain.txt")), CrawlOutcome::Completed);
        assert_eq!(crawler.crawl(&dir.path().join("missing")), CrawlOutcome::Completed);
        assert_eq!(crawler.stats().skipped, 2);
        drop(crawler);

        assert_eq!(count(&store, "directory"), 0);
    }

    #[test]
    fn test_deep_tree_uses_explicit_stack() {
        let dir = tempdir().unwrap();
        let mut deepest = dir.path().to_path_buf();
        for _ in 0..200 {
            deepest.push("d");
        }
        fs::create_dir_all(&deepest).unwrap();
        fs::write(deepest.join("leaf.txt"), b"leaf").unwrap();

        let (mut store, job) = store_with_job();
        let mut crawler = Crawler::new(
            &mut store,
            job,
            &CrawlOptions::default(),
            Arc::new(AtomicBool::new(false)),
        );
        assert_eq!(crawler.crawl(dir.path()), CrawlOutcome::Completed);
        assert_eq!(crawler.stats().dirs, 201);
        assert_eq!(crawler.stats().files, 1);
    }

    #[test]
    fn test_digests_recorded_when_requested() {
        let dir = flat_tree(&["a.txt", "b.txt"]);
        let (mut store, job) = store_with_job();
        let options = CrawlOptions {
            compute_digest: true,
            chunk_size: 3,
        };

        let mut crawler = Crawler::new(&mut store, job, &options, Arc::new(AtomicBool::new(false)));
        crawler.crawl(dir.path());
        assert_eq!(crawler.stats().digests, 2);
        drop(crawler);

        let digest: String = store
            .connection()
            .query_row("SELECT digest FROM file WHERE name = 'a.txt'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(digest, digest_bytes(b"a.txt"));
    }

    #[test]
    fn test_persistence_failure_skips_only_that_file() {
        let dir = flat_tree(&["a.txt", "poison.txt", "z.txt"]);
        let (mut store, job) = store_with_job();
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON file
                 WHEN NEW.name = 'poison.txt'
                 BEGIN SELECT RAISE(ABORT, 'simulated conflict'); END;",
            )
            .unwrap();

        let mut crawler = Crawler::new(
            &mut store,
            job,
            &CrawlOptions::default(),
            Arc::new(AtomicBool::new(false)),
        );
        assert_eq!(crawler.crawl(dir.path()), CrawlOutcome::Completed);
        assert_eq!(crawler.stats().files, 2);
        assert_eq!(crawler.stats().unpersisted, 1);
        drop(crawler);

        assert_eq!(file_names(&store), vec!["a.txt", "z.txt"]);
    }

    #[test]
    fn test_directory_persistence_failure_skips_subtree() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bad/inner")).unwrap();
        fs::create_dir(dir.path().join("good")).unwrap();
        fs::write(dir.path().join("bad/x.txt"), b"x").unwrap();
        fs::write(dir.path().join("bad/inner/z.txt"), b"z").unwrap();
        fs::write(dir.path().join("good/y.txt"), b"y").unwrap();

        let (mut store, job) = store_with_job();
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER reject_bad_dir BEFORE INSERT ON directory
                 WHEN NEW.name = 'bad'
                 BEGIN SELECT RAISE(ABORT, 'simulated conflict'); END;",
            )
            .unwrap();

        let mut crawler = Crawler::new(
            &mut store,
            job,
            &CrawlOptions::default(),
            Arc::new(AtomicBool::new(false)),
        );
        assert_eq!(crawler.crawl(dir.path()), CrawlOutcome::Completed);
        assert_eq!(crawler.stats().dirs, 2);
        assert_eq!(crawler.stats().files, 1);
        assert_eq!(crawler.stats().unpersisted, 1);
        drop(crawler);

        assert_eq!(file_names(&store), vec!["y.txt"]);
        let names: Vec<String> = store
            .connection()
            .prepare("SELECT name FROM directory WHERE parent IS NOT NULL")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(names, vec!["good"]);
    }

    #[test]
    fn test_file_dropped_when_digest_abandoned() {
        let dir = flat_tree(&["a.txt"]);
        let path = dir.path().join("a.txt");
        let meta = fs::metadata(&path).unwrap();

        let (mut store, job) = store_with_job();
        let root = store
            .create_directory(job, None, b"/r", &EntryStat::default())
            .unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let options = CrawlOptions {
            compute_digest: true,
            chunk_size: 1,
        };
        let mut crawler = Crawler::new(&mut store, job, &options, Arc::clone(&shutdown));
        shutdown.store(true, Ordering::SeqCst);
        crawler.persist_file(root, &path, b"a.txt", &meta);

        assert_eq!(crawler.stats().files, 0);
        assert_eq!(crawler.stats().unreadable, 0);
        drop(crawler);
        assert_eq!(count(&store, "file"), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_handle_exhaustion_detected() {
        assert!(is_handle_exhaustion(&io::Error::from_raw_os_error(EMFILE)));
        assert!(!is_handle_exhaustion(&io::Error::from(
            io::ErrorKind::PermissionDenied
        )));
    }

    #[test]
    fn test_shutdown_before_start() {
        let dir = flat_tree(&["a.txt"]);
        let (mut store, job) = store_with_job();

        let mut crawler = Crawler::new(
            &mut store,
            job,
            &CrawlOptions::default(),
            Arc::new(AtomicBool::new(true)),
        );
        assert_eq!(crawler.crawl(dir.path()), CrawlOutcome::Interrupted);
        drop(crawler);

        assert_eq!(count(&store, "directory"), 0);
    }

    #[test]
    fn test_interrupt_stops_intake() {
        let names: Vec<String> = (0..20).map(|i| format!("f{:02}.txt", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let dir = flat_tree(&refs);
        let (mut store, job) = store_with_job();

        let shutdown = Arc::new(AtomicBool::new(false));
        let trigger = Arc::clone(&shutdown);
        let mut crawler = Crawler::new(&mut store, job, &CrawlOptions::default(), shutdown)
            .with_progress(move |stats| {
                if stats.files >= 3 {
                    trigger.store(true, Ordering::SeqCst);
                }
            });

        assert_eq!(crawler.crawl(dir.path()), CrawlOutcome::Interrupted);
        assert_eq!(crawler.stats().files, 3);
        drop(crawler);

        assert_eq!(count(&store, "file"), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_vanished_entry_does_not_stop_siblings() {
        let dir = flat_tree(&["a.txt", "z.txt"]);
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("ghost")).unwrap();

        let (mut store, job) = store_with_job();
        let mut crawler = Crawler::new(
            &mut store,
            job,
            &CrawlOptions::default(),
            Arc::new(AtomicBool::new(false)),
        );
        assert_eq!(crawler.crawl(dir.path()), CrawlOutcome::Completed);
        assert_eq!(crawler.stats().vanished, 1);
        assert_eq!(crawler.stats().files, 2);
        drop(crawler);

        assert_eq!(file_names(&store), vec!["a.txt", "z.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        fs::write(dir.path().join("real/target.txt"), b"target").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real/target.txt"), dir.path().join("link.txt"))
            .unwrap();
        // A link back to the root would loop forever if followed
        std::os::unix::fs::symlink(dir.path(), dir.path().join("real/loop")).unwrap();

        let (mut store, job) = store_with_job();
        let mut crawler = Crawler::new(
            &mut store,
            job,
            &CrawlOptions::default(),
            Arc::new(AtomicBool::new(false)),
        );
        assert_eq!(crawler.crawl(dir.path()), CrawlOutcome::Completed);
        assert_eq!(crawler.stats().dirs, 2);
        assert_eq!(crawler.stats().files, 2);
        assert_eq!(crawler.stats().skipped, 1);
        drop(crawler);

        assert_eq!(file_names(&store), vec!["link.txt", "target.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unlistable_directory_skips_subtree_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let locked = dir.path().join("locked");
        let open = dir.path().join("open");
        fs::create_dir(&locked).unwrap();
        fs::create_dir(&open).unwrap();
        fs::write(locked.join("secret.txt"), b"s").unwrap();
        fs::write(open.join("visible.txt"), b"v").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits are not enforced for root
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let (mut store, job) = store_with_job();
        let mut crawler = Crawler::new(
            &mut store,
            job,
            &CrawlOptions::default(),
            Arc::new(AtomicBool::new(false)),
        );
        let outcome = crawler.crawl(dir.path());
        let stats = crawler.stats().clone();
        drop(crawler);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(outcome, CrawlOutcome::Completed);
        assert_eq!(stats.unlistable, 1);
        // The locked directory itself is recorded, its content is not
        assert_eq!(stats.dirs, 3);
        assert_eq!(file_names(&store), vec!["visible.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_keeps_record_without_digest() {
        use std::os::unix::fs::PermissionsExt;

        let dir = flat_tree(&["readable.txt", "sealed.txt"]);
        let sealed = dir.path().join("sealed.txt");
        fs::set_permissions(&sealed, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::File::open(&sealed).is_ok() {
            return;
        }

        let (mut store, job) = store_with_job();
        let options = CrawlOptions {
            compute_digest: true,
            ..Default::default()
        };
        let mut crawler = Crawler::new(&mut store, job, &options, Arc::new(AtomicBool::new(false)));
        crawler.crawl(dir.path());
        assert_eq!(crawler.stats().files, 2);
        assert_eq!(crawler.stats().unreadable, 1);
        drop(crawler);

        let digest: Option<String> = store
            .connection()
            .query_row("SELECT digest FROM file WHERE name = 'sealed.txt'", [], |row| row.get(0))
            .unwrap();
        assert!(digest.is_none());
    }
}
