//! Sink for the ingestion result.
//!
//! Writes the concatenated table as a single Parquet object.

pub mod parquet;

pub use self::parquet::{ParquetSink, encode};

/// Information about a written Parquet file.
#[derive(Debug, Clone)]
pub struct FinishedFile {
    /// Object name relative to the sink root.
    pub filename: String,
    /// The size of the file in bytes.
    pub size: usize,
    /// Number of records in the file.
    pub record_count: usize,
}
