//! fs-inventory - Filesystem Inventory Crawler
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use fs_inventory::config::{CliArgs, Command, InventoryConfig};
use fs_inventory::db::{list_jobs, size_histogram, unterminated_jobs, InventoryStore, JobSummary, SizeBucket};
use fs_inventory::progress::{print_header, print_histogram, print_jobs, print_summary, ProgressReporter};
use fs_inventory::types::{DirectoryId, JobId};
use fs_inventory::InventoryJob;
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose, args.sql_debug)?;

    match args.command.clone() {
        Some(Command::Report {
            database,
            job,
            json,
        }) => run_report(&database, job.map(JobId), json),
        Some(Command::Path {
            directory,
            database,
        }) => run_path(&database, DirectoryId(directory)),
        None => run_scan(args),
    }
}

/// Inventory the configured roots
fn run_scan(args: CliArgs) -> Result<()> {
    // Validate and create config
    let config = InventoryConfig::from_args(args).context("Invalid configuration")?;

    let mut store = InventoryStore::open(&config.database_path)
        .context("Failed to open inventory database")?;
    if config.sql_debug {
        store.enable_sql_trace();
    }

    if config.nuke {
        warn!(
            "Dropping existing tables in {}",
            config.database_path.display()
        );
        store
            .reset_schema()
            .context("Failed to recreate inventory tables")?;
    }

    let db_path = config.database_path.display().to_string();
    let job = InventoryJob::new(config.scan);
    if config.show_progress {
        print_header(
            &job.config().roots,
            job.config().crawl.compute_digest,
            &db_path,
        );
    }

    // Setup signal handler for graceful shutdown
    let shutdown_flag = job.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let report = if config.show_progress {
        let mut progress = ProgressReporter::new();
        progress.set_status("Scanning...");

        let report = match job.run_with_progress(&mut store, |stats| progress.update(stats)) {
            Ok(report) => report,
            Err(e) => {
                progress.finish_and_clear();
                return Err(e).context("Inventory failed");
            }
        };

        if report.completed {
            progress.finish("Inventory completed");
        } else {
            progress.finish("Inventory interrupted");
        }
        report
    } else {
        job.run(&mut store).context("Inventory failed")?
    };

    if config.show_progress {
        let db_size = std::fs::metadata(&config.database_path)
            .ok()
            .map(|m| m.len());
        print_summary(&report, &db_path, db_size);
    }

    // Report success/failure
    if !report.completed {
        info!(job = report.job_id.0, "Inventory was interrupted before completion");
    }

    if report.stats.errors() > 0 {
        info!(
            errors = report.stats.errors(),
            "Inventory completed with errors"
        );
    }

    Ok(())
}

#[derive(Serialize)]
struct ReportOutput<'a> {
    jobs: &'a [JobSummary],
    unterminated: Vec<i64>,
    sizes: &'a [SizeBucket],
}

/// Print the job listing and size distribution
fn run_report(database: &Path, job: Option<JobId>, json: bool) -> Result<()> {
    let store = InventoryStore::open(database).context("Failed to open inventory database")?;
    let conn = store.connection();

    let jobs = list_jobs(conn).context("Failed to list jobs")?;
    let sizes = size_histogram(conn, job).context("Failed to compute size distribution")?;
    let unterminated = unterminated_jobs(conn).context("Failed to list unterminated jobs")?;

    if json {
        let output = ReportOutput {
            jobs: &jobs,
            unterminated: unterminated.iter().map(|j| j.0).collect(),
            sizes: &sizes,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_jobs(&jobs);
        print_histogram(&sizes);
    }

    Ok(())
}

/// Print the reconstructed path of one directory
fn run_path(database: &Path, directory: DirectoryId) -> Result<()> {
    let store = InventoryStore::open(database).context("Failed to open inventory database")?;
    let path = store
        .resolve_path(directory)
        .with_context(|| format!("Failed to resolve directory {}", directory))?;
    println!("{}", path);
    Ok(())
}

fn setup_logging(verbosity: u8, sql_debug: bool) -> Result<()> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = format!("fs_inventory={},warn", level);
        if sql_debug {
            directives.push_str(",fs_inventory::sql=debug");
        }
        EnvFilter::new(directives)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
