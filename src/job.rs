//! Job lifecycle
//!
//! Coordinates one inventory run:
//! - Job row creation (start timestamp and metadata)
//! - Crawling each root in order with a shared shutdown flag
//! - Job completion, or leaving the end timestamp null on interrupt

use crate::config::ScanConfig;
use crate::db::InventoryStore;
use crate::error::{ConfigError, Result};
use crate::types::{JobId, JobMetadata};
use crate::walker::{CrawlOutcome, CrawlStats, Crawler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Result of an inventory run
#[derive(Debug, Clone)]
pub struct JobReport {
    /// Job row the records belong to
    pub job_id: JobId,

    /// Counters over all roots
    pub stats: CrawlStats,

    /// Time taken for the run
    pub duration: Duration,

    /// Whether the run completed (vs was interrupted)
    pub completed: bool,
}

/// One inventory run over a set of roots
pub struct InventoryJob {
    config: ScanConfig,
    shutdown: Arc<AtomicBool>,
}

impl InventoryJob {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run the job without progress reporting
    pub fn run(&self, store: &mut InventoryStore) -> Result<JobReport> {
        self.run_with_progress(store, |_| {})
    }

    /// Run the job, calling `progress` after every committed record
    ///
    /// Only an empty root list or failing to create or end the job row is an
    /// error; everything that goes wrong on individual entries is logged and
    /// counted.
    pub fn run_with_progress<F>(&self, store: &mut InventoryStore, progress: F) -> Result<JobReport>
    where
        F: FnMut(&CrawlStats),
    {
        if self.config.roots.is_empty() {
            return Err(ConfigError::NoRoots.into());
        }

        let start_time = Instant::now();
        // The job row records what the crawl will actually do
        let metadata = JobMetadata {
            hashing_enabled: self.config.crawl.compute_digest,
            ..self.config.metadata.clone()
        };
        let job_id = store.create_job(&metadata)?;
        info!(
            job = job_id.0,
            roots = self.config.roots.len(),
            digest = self.config.crawl.compute_digest,
            "Job started"
        );

        let mut crawler = Crawler::new(store, job_id, &self.config.crawl, self.shutdown_flag())
            .with_progress(progress);

        let mut completed = true;
        for root in &self.config.roots {
            if crawler.crawl(root) == CrawlOutcome::Interrupted {
                completed = false;
                break;
            }
        }
        let stats = crawler.into_stats();

        // A flag raised after the last entry still counts as an interrupt
        if completed && self.shutdown.load(Ordering::SeqCst) {
            completed = false;
        }

        if completed {
            store.end_job(job_id)?;
        } else {
            warn!(job = job_id.0, "Job interrupted by user");
        }

        let duration = start_time.elapsed();
        info!(
            job = job_id.0,
            dirs = stats.dirs,
            files = stats.files,
            bytes = stats.bytes,
            errors = stats.errors(),
            duration_secs = duration.as_secs(),
            "Job finished"
        );

        Ok(JobReport {
            job_id,
            stats,
            duration,
            completed,
        })
    }
}
