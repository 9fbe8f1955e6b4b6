//! sleet: load new spreadsheet/CSV files from a bucket prefix.
//!
//! Reads the job configuration, runs one ingestion pass and optionally writes
//! the concatenated result as Parquet.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use sleet::config::Config;
use sleet::error::{AddressParseSnafu, ConfigSnafu, IngestAbortedSnafu, MetricsSnafu, PipelineError};
use sleet::ingest::{FileStatus, IngestOutcome, LedgerUpdate, ingest, plan};
use sleet::metrics;
use sleet::sink::ParquetSink;
use sleet::storage::StorageProvider;

/// Incremental spreadsheet/CSV loader.
#[derive(Parser, Debug)]
#[command(name = "sleet")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - list what would be read without downloading or writing.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("sleet starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    // Initialize metrics if enabled
    let metrics_server = if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        let server = metrics::init(addr).await.context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            server.local_addr()
        );
        Some(server)
    } else {
        None
    };

    let result = run(&args, &config).await;

    if let Some(server) = metrics_server {
        debug!("Final metrics:\n{}", server.shutdown());
    }
    result
}

/// One ingestion pass, optionally followed by the Parquet write.
async fn run(args: &Args, config: &Config) -> Result<(), PipelineError> {
    let storage = StorageProvider::for_url_with_options(
        &config.source.url,
        config.source.storage_options.clone(),
    )
    .await?;
    let request = config.ingest_request();

    if args.dry_run {
        return dry_run(&storage, config).await;
    }

    let report = ingest(&storage, &request).await;

    if let IngestOutcome::Failed { stage, message } = &report.outcome {
        return IngestAbortedSnafu {
            stage: stage.to_string(),
            message: message.clone(),
        }
        .fail();
    }

    info!("Ingestion completed: {:?}", report.outcome);
    info!("  Files parsed: {}", report.parsed_files().count());
    info!("  Files failed: {}", report.failed_count());
    info!(
        "  Files already processed: {}",
        report
            .files
            .iter()
            .filter(|f| f.status == FileStatus::AlreadyProcessed)
            .count()
    );
    info!("  Rows: {}", report.table.num_rows());
    match &report.ledger {
        LedgerUpdate::Written { added, total } => {
            info!("  Ledger: {} added, {} total", added, total)
        }
        LedgerUpdate::Failed { message } => {
            warn!("  Ledger not updated ({}); these files will be read again", message)
        }
        other => info!("  Ledger: {:?}", other),
    }

    if let Some(sink_config) = &config.sink {
        if report.is_empty() {
            info!("Nothing to write to {}", sink_config.path);
        } else {
            let sink_storage = StorageProvider::for_url_with_options(
                &sink_config.path,
                sink_config.storage_options.clone(),
            )
            .await?;
            let sink = ParquetSink::new(sink_storage, sink_config.compression);
            let finished = sink.write(&report.table, &request.target).await?;
            info!(
                "  Parquet file written: {} ({} bytes)",
                finished.filename, finished.size
            );
        }
    }

    Ok(())
}

async fn dry_run(storage: &StorageProvider, config: &Config) -> Result<(), PipelineError> {
    info!("Dry run mode - planning ingestion");
    info!("Source: {}", storage.canonical_url());
    info!("Prefix: '{}'", config.source.prefix);

    let plan = plan(storage, &config.ingest_request()).await?;

    match &plan.ledger_path {
        Some(path) if plan.ledger_exists => {
            info!("Ledger: {} ({} entries)", path, plan.ledger_entries)
        }
        Some(path) => info!("Ledger: {} (not found)", path),
        None => info!("Ledger: disabled"),
    }
    match plan.format {
        Some(format) => info!("Reader: {:?}", format),
        None => warn!(
            "No reader for file type {}; every file would be skipped",
            config.source.file_type
        ),
    }
    info!("Candidates: {}", plan.candidates.len());
    for candidate in &plan.already_processed {
        info!("  - skip {}", candidate.path);
    }
    for candidate in &plan.to_read {
        info!("  - read {}", candidate.path);
    }
    if let Some(sink) = &config.sink {
        info!("Sink: {} ({:?})", sink.path, sink.compression);
    }
    info!("Configuration is valid");
    Ok(())
}
