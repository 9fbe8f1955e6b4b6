//! Result types for ingestion runs.

use arrow::array::RecordBatch;
use object_store::path::Path;

use crate::metrics::events::FailureStage;
use crate::source::{CandidateFile, FileFormat};
use crate::table::empty_table;

/// Step at which a run was aborted before producing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    /// Reading the ledger.
    Ledger,
    /// Listing the prefix.
    Listing,
    /// Combining the parsed tables.
    Assemble,
}

impl SetupStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupStage::Ledger => "ledger",
            SetupStage::Listing => "listing",
            SetupStage::Assemble => "assemble",
        }
    }
}

impl std::fmt::Display for SetupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run returned no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    /// No object under the prefix matched the filter.
    NoCandidates,
    /// Every candidate is already in the ledger.
    AllProcessed,
    /// Every file that was tried failed or was unsupported.
    NothingParsed,
}

/// Overall result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Loaded { files: usize, rows: usize },
    Empty(EmptyReason),
    Failed { stage: SetupStage, message: String },
}

/// What happened to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerUpdate {
    /// The run was asked not to use a ledger.
    Disabled,
    /// Nothing new to record.
    Unchanged,
    Written { added: usize, total: usize },
    /// The data was returned but the names were not recorded; they will be
    /// read again by the next run.
    Failed { message: String },
}

/// Outcome for a single candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Parsed { rows: usize },
    Failed { stage: FailureStage, message: String },
    AlreadyProcessed,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub name: String,
    pub path: Path,
    pub status: FileStatus,
}

impl FileReport {
    pub(crate) fn new(candidate: &CandidateFile, status: FileStatus) -> Self {
        Self {
            name: candidate.name.clone(),
            path: candidate.path.clone(),
            status,
        }
    }
}

/// Everything a run produced: the table, the outcome, per-file detail and
/// the ledger result.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub table: RecordBatch,
    pub outcome: IngestOutcome,
    pub files: Vec<FileReport>,
    pub ledger: LedgerUpdate,
}

impl IngestReport {
    pub(crate) fn empty(reason: EmptyReason, files: Vec<FileReport>, ledger: LedgerUpdate) -> Self {
        Self {
            table: empty_table(),
            outcome: IngestOutcome::Empty(reason),
            files,
            ledger,
        }
    }

    pub(crate) fn failed(stage: SetupStage, message: String) -> Self {
        Self {
            table: empty_table(),
            outcome: IngestOutcome::Failed { stage, message },
            files: Vec::new(),
            ledger: LedgerUpdate::Unchanged,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.table.num_rows() == 0
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, IngestOutcome::Failed { .. })
    }

    /// Names of the files that contributed rows, in processing order.
    pub fn parsed_files(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::Parsed { .. }))
            .map(|f| f.name.as_str())
    }

    pub fn failed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::Failed { .. }))
            .count()
    }
}

/// A dry-run view of what [`ingest`](super::ingest) would read.
#[derive(Debug, Clone)]
pub struct IngestPlan {
    pub ledger_path: Option<Path>,
    pub ledger_exists: bool,
    pub ledger_entries: usize,
    /// Reader selected for the file type; `None` means every file would be
    /// skipped as unsupported.
    pub format: Option<FileFormat>,
    pub candidates: Vec<CandidateFile>,
    pub to_read: Vec<CandidateFile>,
    pub already_processed: Vec<CandidateFile>,
}
