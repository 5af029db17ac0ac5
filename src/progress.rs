//! Progress reporting and terminal output
//!
//! Provides real-time progress display using indicatif spinners, plus the
//! end-of-run summary and report tables.

use crate::db::{JobSummary, SizeBucket};
use crate::job::JobReport;
use crate::walker::CrawlStats;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Minimum time between spinner message updates
const UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Progress reporter that displays crawl status
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,

    /// Last message refresh
    last_update: Instant,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            bar,
            last_update: Instant::now(),
        }
    }

    /// Update the progress display (throttled; called once per record)
    pub fn update(&mut self, stats: &CrawlStats) {
        if self.last_update.elapsed() < UPDATE_INTERVAL {
            return;
        }
        self.last_update = Instant::now();

        let elapsed = self.bar.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            stats.records() as f64 / elapsed
        } else {
            0.0
        };

        let msg = format!(
            "Dirs: {} | Files: {} | Size: {} | Errors: {} | Rate: {:.0}/s",
            format_number(stats.dirs),
            format_number(stats.files),
            format_size(stats.bytes, BINARY),
            format_number(stats.errors()),
            rate,
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the run
pub fn print_summary(report: &JobReport, db_path: &str, db_size: Option<u64>) {
    let stats = &report.stats;
    let duration_secs = report.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        stats.records() as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    if report.completed {
        println!("{}", style("Inventory Complete").green().bold());
    } else {
        println!("{}", style("Inventory Interrupted").yellow().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Job:").bold(), report.job_id);
    println!(
        "  {} {}",
        style("Directories:").bold(),
        format_number(stats.dirs)
    );
    println!("  {} {}", style("Files:").bold(), format_number(stats.files));
    println!(
        "  {} {}",
        style("Total Size:").bold(),
        format_size(stats.bytes, BINARY)
    );
    if stats.digests > 0 {
        println!(
            "  {} {}",
            style("Digests:").bold(),
            format_number(stats.digests)
        );
    }
    println!(
        "  {} {:.1}s ({:.0} records/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if stats.skipped > 0 {
        println!(
            "  {} {}",
            style("Skipped:").dim(),
            format_number(stats.skipped)
        );
    }
    if stats.errors() > 0 {
        println!(
            "  {} {} (vanished {}, unlistable {}, unreadable {}, not saved {})",
            style("Errors:").yellow().bold(),
            format_number(stats.errors()),
            stats.vanished + stats.stat_failures,
            stats.unlistable,
            stats.unreadable,
            stats.unpersisted,
        );
    }
    if let Some(size) = db_size {
        println!(
            "  {} {} ({})",
            style("Database:").bold(),
            db_path,
            format_size(size, BINARY)
        );
    } else {
        println!("  {} {}", style("Database:").bold(), db_path);
    }
    println!();
}

/// Print a header at the start of the run
pub fn print_header(roots: &[PathBuf], digest: bool, output: &str) {
    println!();
    println!(
        "{} {}",
        style("fs-inventory").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    for root in roots {
        println!("  {} {}", style("Source:").bold(), root.display());
    }
    println!(
        "  {} {}",
        style("Digests:").bold(),
        if digest { "on" } else { "off" }
    );
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}

/// Print the job listing
pub fn print_jobs(jobs: &[JobSummary]) {
    println!("{}", style("Jobs").cyan().bold());
    println!("{}", style("─".repeat(50)).dim());
    if jobs.is_empty() {
        println!("  (none)");
    }
    for job in jobs {
        let status = if job.ended.is_some() {
            style(job.status()).green()
        } else {
            style(job.status()).yellow()
        };
        println!(
            "  {} {} {}  {}",
            style(format!("#{}", job.id)).bold(),
            job.started,
            status,
            job.comment.as_deref().unwrap_or("")
        );
        println!(
            "      {} dirs, {} files, {}{}",
            format_number(job.directories),
            format_number(job.files),
            format_size(job.bytes, BINARY),
            if job.hashing_enabled { ", digests" } else { "" }
        );
    }
    println!();
}

/// Print the file count per rounded MiB size
pub fn print_histogram(buckets: &[SizeBucket]) {
    println!("{}", style("File sizes (MiB, rounded)").cyan().bold());
    println!("{}", style("─".repeat(50)).dim());
    for bucket in buckets {
        println!(
            "  {:>8} {}",
            format_number(bucket.mib),
            format_number(bucket.files)
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }

    #[test]
    fn test_update_throttled() {
        let mut reporter = ProgressReporter::new();
        reporter.last_update = Instant::now() - UPDATE_INTERVAL * 2;

        let stats = CrawlStats {
            dirs: 1,
            files: 1_500,
            ..Default::default()
        };
        reporter.update(&stats);
        assert!(reporter.last_update.elapsed() < UPDATE_INTERVAL);
        reporter.finish_and_clear();
    }
}
