//! Incremental ingestion with a processed-file ledger.
//!
//! [`ingest`] reads the ledger under a prefix, lists the candidate files the
//! ledger does not mention yet, parses them one after another, concatenates
//! the parsed tables and records the successfully parsed names back in the
//! ledger. Failures never escape: setup failures abort the run with an empty
//! table, per-file failures only drop that file, and a failed ledger write is
//! reported next to the data it would have recorded.

mod report;

pub use report::{
    EmptyReason, FileReport, FileStatus, IngestOutcome, IngestPlan, IngestReport, LedgerUpdate,
    SetupStage,
};

use arrow::array::RecordBatch;
use object_store::path::Path;
use snafu::prelude::*;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::emit;
use crate::error::{LedgerError, PipelineError, UnsupportedFileTypeSnafu};
use crate::ledger::{Ledger, LedgerWriteMode, WRITE_PERMISSION_HINT};
use crate::metrics::events::{
    BytesRead, FailureStage, FileFailed, FileParseCompleted, FileProcessed,
    FileStatus as FileStatusEvent, FilesDiscovered, LedgerEntries, LedgerWrite, LedgerWriteStatus,
    PendingFiles, RecordsIngested, RunAborted,
};
use crate::source::{CandidateFile, CandidateFilter, FileFormat, ReadOptions, discover, read_table};
use crate::storage::StorageProvider;
use crate::table::{concat_tables, with_file_column};

/// Parameters of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    /// Path prefix to scan; the ledger lives directly under it.
    pub prefix: String,
    /// Required object name suffix, e.g. `.xlsx`.
    pub file_type: String,
    /// Required start of the trailing name segment.
    pub file_prefix: Option<String>,
    /// Only list objects directly under the prefix.
    pub flat_listing: bool,
    /// Consult and update the ledger.
    pub use_ledger: bool,
    pub ledger_write: LedgerWriteMode,
    pub read: ReadOptions,
    /// Metrics label for this run.
    pub target: String,
}

impl IngestRequest {
    /// A recursive, ledger-backed request with default read options.
    pub fn new(prefix: impl Into<String>, file_type: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            target: prefix.clone(),
            prefix,
            file_type: file_type.into(),
            file_prefix: None,
            flat_listing: false,
            use_ledger: true,
            ledger_write: LedgerWriteMode::default(),
            read: ReadOptions::default(),
        }
    }

    pub fn with_file_prefix(mut self, file_prefix: impl Into<String>) -> Self {
        self.file_prefix = Some(file_prefix.into());
        self
    }

    pub fn with_flat_listing(mut self, flat_listing: bool) -> Self {
        self.flat_listing = flat_listing;
        self
    }

    pub fn with_ledger(mut self, use_ledger: bool) -> Self {
        self.use_ledger = use_ledger;
        self
    }

    pub fn with_ledger_write(mut self, mode: LedgerWriteMode) -> Self {
        self.ledger_write = mode;
        self
    }

    pub fn with_read_options(mut self, read: ReadOptions) -> Self {
        self.read = read;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    fn filter(&self) -> CandidateFilter {
        CandidateFilter::new(&self.file_type, self.file_prefix.clone())
    }
}

/// Run one ingestion pass over `request.prefix`.
///
/// Objects are listed once, downloaded and parsed sequentially in listing
/// order, and the ledger is written at most once.
pub async fn ingest(storage: &StorageProvider, request: &IngestRequest) -> IngestReport {
    let target = request.target.clone();
    info!(
        "Ingesting {} files under '{}' in {}",
        request.file_type,
        request.prefix,
        storage.canonical_url()
    );

    // Ledger
    let ledger = if request.use_ledger {
        match Ledger::load(storage, &request.prefix).await {
            Ok(ledger) => {
                if ledger.exists() {
                    info!(
                        "Ledger {} found with {} previously processed files",
                        ledger.path(),
                        ledger.len()
                    );
                } else {
                    info!(
                        "Ledger {} not found, all matching files will be processed",
                        ledger.path()
                    );
                }
                emit!(LedgerEntries {
                    count: ledger.len(),
                    target: target.clone(),
                });
                Some(ledger)
            }
            Err(e) => return aborted(SetupStage::Ledger, e.to_string(), target),
        }
    } else {
        None
    };
    let ledger_unchanged = if ledger.is_some() {
        LedgerUpdate::Unchanged
    } else {
        LedgerUpdate::Disabled
    };

    // Listing
    let candidates =
        match discover(storage, &request.prefix, request.flat_listing, &request.filter()).await {
            Ok(candidates) => candidates,
            Err(e) => return aborted(SetupStage::Listing, e.to_string(), target),
        };
    emit!(FilesDiscovered {
        count: candidates.len() as u64,
        target: target.clone(),
    });

    if candidates.is_empty() {
        info!("No files match the criteria");
        return IngestReport::empty(EmptyReason::NoCandidates, Vec::new(), ledger_unchanged);
    }

    // Ledger filter
    let mut files = Vec::with_capacity(candidates.len());
    let mut to_read = Vec::new();
    for candidate in candidates {
        if ledger.as_ref().is_some_and(|l| l.contains(&candidate.name)) {
            info!("Skipping {} (already in the ledger)", candidate.name);
            emit!(FileProcessed {
                status: FileStatusEvent::Skipped,
                target: target.clone(),
            });
            files.push(FileReport::new(&candidate, FileStatus::AlreadyProcessed));
        } else {
            to_read.push(candidate);
        }
    }

    if to_read.is_empty() {
        info!(
            "Found {} matching files, but all were already processed",
            files.len()
        );
        return IngestReport::empty(EmptyReason::AllProcessed, files, ledger_unchanged);
    }

    info!("Processing {} new or unrecorded files", to_read.len());

    // Per-file processing
    let format = FileFormat::from_file_type(&request.file_type);
    let mut tables = Vec::new();
    let mut failed_names = HashSet::new();

    for (index, candidate) in to_read.iter().enumerate() {
        emit!(PendingFiles {
            count: to_read.len() - index,
            target: target.clone(),
        });

        let status = match format {
            None => {
                warn!(
                    "Unsupported file type {} for {}",
                    request.file_type, candidate.path
                );
                emit!(FileProcessed {
                    status: FileStatusEvent::Skipped,
                    target: target.clone(),
                });
                FileStatus::Unsupported
            }
            Some(format) => match read_file(storage, candidate, format, &request.read, &target).await
            {
                Ok(table) => {
                    let rows = table.num_rows();
                    debug!("Read {} rows from {}", rows, candidate.path);
                    emit!(RecordsIngested {
                        count: rows as u64,
                        target: target.clone(),
                    });
                    emit!(FileProcessed {
                        status: FileStatusEvent::Parsed,
                        target: target.clone(),
                    });
                    tables.push(table);
                    FileStatus::Parsed { rows }
                }
                Err(failure) => {
                    error!(
                        "Failed to read {} ({}): {}",
                        candidate.name, failure.stage, failure.message
                    );
                    emit!(FileFailed {
                        stage: failure.stage,
                        target: target.clone(),
                    });
                    emit!(FileProcessed {
                        status: FileStatusEvent::Failed,
                        target: target.clone(),
                    });
                    failed_names.insert(candidate.name.clone());
                    FileStatus::Failed {
                        stage: failure.stage,
                        message: failure.message,
                    }
                }
            },
        };

        files.push(FileReport::new(candidate, status));
    }

    emit!(PendingFiles {
        count: 0,
        target: target.clone(),
    });

    if tables.is_empty() {
        warn!("No file could be processed successfully");
        return IngestReport::empty(EmptyReason::NothingParsed, files, ledger_unchanged);
    }

    let table = match concat_tables(&tables) {
        Ok(table) => table,
        Err(e) => return aborted(SetupStage::Assemble, e.to_string(), target),
    };
    let loaded_files = tables.len();
    info!(
        "Concatenated {} tables into {} rows x {} columns",
        loaded_files,
        table.num_rows(),
        table.num_columns()
    );

    // Ledger update
    let ledger_update = match &ledger {
        None => LedgerUpdate::Disabled,
        Some(ledger) => {
            let additions = ledger_additions(&files, ledger, &failed_names);
            if additions.is_empty() {
                LedgerUpdate::Unchanged
            } else {
                write_ledger(storage, ledger, &additions, request.ledger_write, &target).await
            }
        }
    };

    IngestReport {
        outcome: IngestOutcome::Loaded {
            files: loaded_files,
            rows: table.num_rows(),
        },
        table,
        files,
        ledger: ledger_update,
    }
}

/// Names to append: parsed in this run, in processing order, once each.
///
/// A name shared by several listed objects only qualifies when none of them
/// failed. Names already in the ledger are not repeated.
fn ledger_additions(
    files: &[FileReport],
    ledger: &Ledger,
    failed_names: &HashSet<String>,
) -> Vec<String> {
    let mut queued = HashSet::new();
    files
        .iter()
        .filter(|file| matches!(file.status, FileStatus::Parsed { .. }))
        .filter(|file| !failed_names.contains(&file.name) && !ledger.contains(&file.name))
        .filter(|file| queued.insert(file.name.clone()))
        .map(|file| file.name.clone())
        .collect()
}

async fn write_ledger(
    storage: &StorageProvider,
    ledger: &Ledger,
    additions: &[String],
    mode: LedgerWriteMode,
    target: &str,
) -> LedgerUpdate {
    match ledger.save(storage, additions, mode).await {
        Ok(total) => {
            info!(
                "Ledger {} updated with {} new file(s), {} total",
                ledger.path(),
                additions.len(),
                total
            );
            emit!(LedgerWrite {
                status: LedgerWriteStatus::Written,
                target: target.to_string(),
            });
            emit!(LedgerEntries {
                count: total,
                target: target.to_string(),
            });
            LedgerUpdate::Written {
                added: additions.len(),
                total,
            }
        }
        Err(e) => {
            let (status, message) = if matches!(e, LedgerError::LedgerConflict { .. }) {
                (LedgerWriteStatus::Conflict, e.to_string())
            } else {
                (
                    LedgerWriteStatus::Failed,
                    format!(
                        "{e}; the run needs write permission ({WRITE_PERMISSION_HINT}) on {}",
                        storage.canonical_url()
                    ),
                )
            };
            error!("Failed to update ledger {}: {}", ledger.path(), message);
            emit!(LedgerWrite {
                status,
                target: target.to_string(),
            });
            LedgerUpdate::Failed { message }
        }
    }
}

struct FileFailure {
    stage: FailureStage,
    message: String,
}

async fn read_file(
    storage: &StorageProvider,
    candidate: &CandidateFile,
    format: FileFormat,
    options: &ReadOptions,
    target: &str,
) -> Result<RecordBatch, FileFailure> {
    let data = storage
        .get(&candidate.path)
        .await
        .map_err(|e| FileFailure {
            stage: FailureStage::Download,
            message: e.to_string(),
        })?;
    emit!(BytesRead {
        bytes: data.len() as u64,
        target: target.to_string(),
    });

    let start = Instant::now();
    let parse_failure = |message: String| FileFailure {
        stage: FailureStage::Parse,
        message,
    };
    let table = read_table(format, data, candidate.path.as_ref(), options)
        .map_err(|e| parse_failure(e.to_string()))?;
    emit!(FileParseCompleted {
        duration: start.elapsed(),
        target: target.to_string(),
    });

    with_file_column(&table, &candidate.name).map_err(|e| parse_failure(e.to_string()))
}

fn aborted(stage: SetupStage, message: String, target: String) -> IngestReport {
    error!("Ingestion aborted during {}: {}", stage, message);
    emit!(RunAborted {
        stage: stage.as_str(),
        target,
    });
    IngestReport::failed(stage, message)
}

/// Describe what [`ingest`] would do without downloading or writing.
pub async fn plan(
    storage: &StorageProvider,
    request: &IngestRequest,
) -> Result<IngestPlan, PipelineError> {
    let ledger = if request.use_ledger {
        Some(Ledger::load(storage, &request.prefix).await?)
    } else {
        None
    };

    let candidates =
        discover(storage, &request.prefix, request.flat_listing, &request.filter()).await?;

    let (already_processed, to_read): (Vec<_>, Vec<_>) = candidates
        .iter()
        .cloned()
        .partition(|c| ledger.as_ref().is_some_and(|l| l.contains(&c.name)));

    Ok(IngestPlan {
        ledger_path: ledger.as_ref().map(|l| l.path().clone()),
        ledger_exists: ledger.as_ref().is_some_and(Ledger::exists),
        ledger_entries: ledger.as_ref().map_or(0, Ledger::len),
        format: FileFormat::from_file_type(&request.file_type),
        candidates,
        to_read,
        already_processed,
    })
}

/// Download one named object and parse it, without touching any ledger.
pub async fn extract_object(
    storage: &StorageProvider,
    path: &Path,
    format: FileFormat,
    options: &ReadOptions,
) -> Result<RecordBatch, PipelineError> {
    let data = storage.get(path).await?;
    Ok(read_table(format, data, path.as_ref(), options)?)
}

/// [`extract_object`] with the format taken from the object name.
pub async fn extract_object_auto(
    storage: &StorageProvider,
    path: &Path,
    options: &ReadOptions,
) -> Result<RecordBatch, PipelineError> {
    let format = FileFormat::from_file_type(path.as_ref()).context(UnsupportedFileTypeSnafu {
        file_type: path.extension().unwrap_or_default().to_string(),
    })?;
    extract_object(storage, path, format, options).await
}
