//! Error types for the sleet ingestion loader.
//!
//! Each layer owns a snafu enum; the ingestion routine itself never returns
//! these to its caller but records them in the [`IngestReport`].
//!
//! [`IngestReport`]: crate::ingest::IngestReport

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Required regex capture group missing (internal error).
    #[snafu(display("Missing required URL component: {group}"))]
    RegexGroupMissing { group: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// The root directory of a local store could not be created.
    #[snafu(display("Cannot create local store root {path}: {source}"))]
    LocalRoot {
        path: String,
        source: std::io::Error,
    },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },

    /// GCS configuration error.
    #[snafu(display("GCS configuration error: {source}"))]
    GcsConfig { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }

    /// Check if a conditional write lost against a concurrent writer.
    pub fn is_precondition_failed(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => matches!(
                source,
                object_store::Error::Precondition { .. }
                    | object_store::Error::AlreadyExists { .. }
            ),
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Source URL is empty.
    #[snafu(display("Source url cannot be empty"))]
    EmptySourceUrl,

    /// File type is empty.
    #[snafu(display("Source file_type cannot be empty"))]
    EmptyFileType,

    /// Sink path is empty.
    #[snafu(display("Sink path cannot be empty when a sink is configured"))]
    EmptySinkPath,

    /// Delimiter is not a single byte.
    #[snafu(display("Delimiter must be a single ASCII character, got {value:?}"))]
    InvalidDelimiter { value: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },
}

// ============ Reader Errors ============

/// Errors that can occur while decoding a downloaded file into a table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReaderError {
    /// The configured encoding label is not known.
    #[snafu(display("Unknown text encoding: {label}"))]
    UnknownEncoding { label: String },

    /// The delimiter does not fit in a single byte.
    #[snafu(display("Delimiter must be a single ASCII character, got {delimiter:?}"))]
    UnsupportedDelimiter { delimiter: char },

    /// The bytes are not valid in the configured encoding.
    #[snafu(display("Failed to decode {path} as {encoding}"))]
    Decode { path: String, encoding: String },

    /// The file has no header row (or no rows at all).
    #[snafu(display("No columns to parse from {path}"))]
    EmptyFile { path: String },

    /// Malformed delimited text.
    #[snafu(display("Failed to parse {path}: {source}"))]
    Csv { path: String, source: csv::Error },

    /// A row carries more fields than the header declares.
    #[snafu(display("Error tokenizing {path}: expected {expected} fields in line {line}, saw {found}"))]
    RaggedRow {
        path: String,
        line: u64,
        expected: usize,
        found: usize,
    },

    /// The workbook container could not be opened.
    #[snafu(display("Failed to open workbook {path}: {source}"))]
    Workbook {
        path: String,
        source: calamine::Error,
    },

    /// The requested worksheet does not exist.
    #[snafu(display("Worksheet {sheet} not found in {path}"))]
    SheetNotFound { path: String, sheet: String },

    /// Failed to assemble Arrow arrays.
    #[snafu(display("Failed to build table for {path}: {source}"))]
    Arrow {
        path: String,
        source: arrow::error::ArrowError,
    },
}

// ============ Table Errors ============

/// Errors that can occur while assembling the ingestion result.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TableError {
    /// Arrow rejected the assembled columns.
    #[snafu(display("Failed to assemble table: {source}"))]
    Assemble { source: arrow::error::ArrowError },
}

// ============ Ledger Errors ============

/// Errors that can occur while reading or writing the processed-file ledger.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LedgerError {
    /// Failed to download the ledger object.
    #[snafu(display("Failed to read ledger {path}: {source}"))]
    LedgerRead { path: String, source: StorageError },

    /// The ledger object is not UTF-8 text.
    #[snafu(display("Ledger {path} is not valid UTF-8: {source}"))]
    LedgerEncoding {
        path: String,
        source: std::string::FromUtf8Error,
    },

    /// Failed to upload the ledger object.
    #[snafu(display("Failed to write ledger {path}: {source}"))]
    LedgerWrite { path: String, source: StorageError },

    /// A conditional write found the ledger changed since it was read.
    #[snafu(display("Ledger {path} was modified by another run since it was read"))]
    LedgerConflict { path: String },
}

// ============ Sink Errors ============

/// Errors that can occur while writing the ingestion result.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Failed to create Parquet writer.
    #[snafu(display("Failed to create Parquet writer: {source}"))]
    WriterCreate {
        source: parquet::errors::ParquetError,
    },

    /// Failed to write to Parquet.
    #[snafu(display("Failed to write to Parquet: {source}"))]
    ParquetWrite {
        source: parquet::errors::ParquetError,
    },

    /// Failed to upload the Parquet object.
    #[snafu(display("Failed to upload Parquet file: {source}"))]
    SinkUpload { source: StorageError },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// The scrape endpoint could not bind its address.
    #[snafu(display("Failed to bind metrics endpoint to {addr}: {source}"))]
    MetricsBind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Top-level Errors ============

/// Errors surfaced by the fallible entry points and the `sleet` binary.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Storage error.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// Ledger error.
    #[snafu(display("Ledger error: {source}"))]
    Ledger { source: LedgerError },

    /// Reader error.
    #[snafu(display("Reader error: {source}"))]
    Reader { source: ReaderError },

    /// The file type has no registered reader.
    #[snafu(display("Unsupported file type: {file_type}"))]
    UnsupportedFileType { file_type: String },

    /// Sink error.
    #[snafu(display("Sink error: {source}"))]
    Sink { source: SinkError },

    /// Failed to parse metrics address.
    #[snafu(display("Failed to parse metrics address: {source}"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },

    /// The ingestion run aborted before reading any file.
    #[snafu(display("Ingestion aborted during {stage}: {message}"))]
    IngestAborted { stage: String, message: String },
}

impl From<StorageError> for PipelineError {
    fn from(source: StorageError) -> Self {
        PipelineError::Storage { source }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config { source }
    }
}

impl From<LedgerError> for PipelineError {
    fn from(source: LedgerError) -> Self {
        PipelineError::Ledger { source }
    }
}

impl From<ReaderError> for PipelineError {
    fn from(source: ReaderError) -> Self {
        PipelineError::Reader { source }
    }
}

impl From<SinkError> for PipelineError {
    fn from(source: SinkError) -> Self {
        PipelineError::Sink { source }
    }
}
