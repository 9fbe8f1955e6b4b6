//! Internal events for sleet metrics emission.
//!
//! Each event struct represents a measurable occurrence during an ingestion
//! run. Events implement the `InternalEvent` trait which emits the
//! corresponding Prometheus metric.
//!
//! ## Target Labels
//!
//! Metrics carry a `target` label naming the ingestion source (the
//! configured prefix by default) so several jobs can share one dashboard.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when candidate files are discovered during listing.
pub struct FilesDiscovered {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for FilesDiscovered {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Files discovered");
        counter!("sleet_files_discovered_total", "target" => self.target).increment(self.count);
    }
}

/// Event emitted to track files still waiting to be read in this run.
pub struct PendingFiles {
    pub count: usize,
    pub target: String,
}

impl InternalEvent for PendingFiles {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Pending files");
        gauge!("sleet_pending_files", "target" => self.target).set(self.count as f64);
    }
}

/// Outcome of a candidate file.
#[derive(Debug, Clone, Copy)]
pub enum FileStatus {
    Parsed,
    Skipped,
    Failed,
}

impl FileStatus {
    fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Parsed => "parsed",
            FileStatus::Skipped => "skipped",
            FileStatus::Failed => "failed",
        }
    }
}

/// Event emitted once per candidate file.
pub struct FileProcessed {
    pub status: FileStatus,
    pub target: String,
}

impl InternalEvent for FileProcessed {
    fn emit(self) {
        trace!(status = self.status.as_str(), target = %self.target, "File processed");
        counter!("sleet_files_processed_total", "status" => self.status.as_str(), "target" => self.target)
            .increment(1);
    }
}

/// Stage at which a file failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Download,
    Parse,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Download => "download",
            FailureStage::Parse => "parse",
        }
    }
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted when a file fails processing.
pub struct FileFailed {
    pub stage: FailureStage,
    pub target: String,
}

impl InternalEvent for FileFailed {
    fn emit(self) {
        trace!(stage = self.stage.as_str(), target = %self.target, "File failed");
        counter!("sleet_files_failed_total", "stage" => self.stage.as_str(), "target" => self.target)
            .increment(1);
    }
}

/// Event emitted when rows from a parsed file are accumulated.
pub struct RecordsIngested {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for RecordsIngested {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Records ingested");
        counter!("sleet_records_ingested_total", "target" => self.target).increment(self.count);
    }
}

/// Event emitted when raw file bytes are downloaded.
pub struct BytesRead {
    pub bytes: u64,
    pub target: String,
}

impl InternalEvent for BytesRead {
    fn emit(self) {
        trace!(bytes = self.bytes, target = %self.target, "Bytes read");
        counter!("sleet_bytes_read_total", "target" => self.target).increment(self.bytes);
    }
}

/// Event emitted when a file has been decoded into a table.
pub struct FileParseCompleted {
    pub duration: Duration,
    pub target: String,
}

impl InternalEvent for FileParseCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            target = %self.target,
            "File parse completed"
        );
        histogram!("sleet_file_parse_duration_seconds", "target" => self.target)
            .record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Ledger events
// ============================================================================

/// Event emitted with the ledger size after it is loaded or written.
pub struct LedgerEntries {
    pub count: usize,
    pub target: String,
}

impl InternalEvent for LedgerEntries {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Ledger entries");
        gauge!("sleet_ledger_entries", "target" => self.target).set(self.count as f64);
    }
}

/// Result of a ledger write attempt.
#[derive(Debug, Clone, Copy)]
pub enum LedgerWriteStatus {
    Written,
    Conflict,
    Failed,
}

impl LedgerWriteStatus {
    fn as_str(&self) -> &'static str {
        match self {
            LedgerWriteStatus::Written => "written",
            LedgerWriteStatus::Conflict => "conflict",
            LedgerWriteStatus::Failed => "failed",
        }
    }
}

/// Event emitted after each ledger write attempt.
pub struct LedgerWrite {
    pub status: LedgerWriteStatus,
    pub target: String,
}

impl InternalEvent for LedgerWrite {
    fn emit(self) {
        trace!(status = self.status.as_str(), target = %self.target, "Ledger write");
        counter!("sleet_ledger_writes_total", "status" => self.status.as_str(), "target" => self.target)
            .increment(1);
    }
}

/// Event emitted when a run aborts before any file is read.
pub struct RunAborted {
    pub stage: &'static str,
    pub target: String,
}

impl InternalEvent for RunAborted {
    fn emit(self) {
        trace!(stage = self.stage, target = %self.target, "Run aborted");
        counter!("sleet_runs_aborted_total", "stage" => self.stage, "target" => self.target)
            .increment(1);
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Head,
    Put,
    List,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Head => "head",
            StorageOperation::Put => "put",
            StorageOperation::List => "list",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "sleet_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a storage request completes with duration.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request duration"
        );
        histogram!(
            "sleet_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Sink events
// ============================================================================

/// Event emitted when the result table is written as Parquet.
pub struct ParquetFileWritten {
    pub bytes: usize,
    pub target: String,
}

impl InternalEvent for ParquetFileWritten {
    fn emit(self) {
        trace!(bytes = self.bytes, target = %self.target, "Parquet file written");
        counter!("sleet_parquet_files_written_total", "target" => self.target.clone())
            .increment(1);
        counter!("sleet_parquet_bytes_written_total", "target" => self.target)
            .increment(self.bytes as u64);
    }
}
