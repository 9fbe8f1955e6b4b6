//! sleet: incremental spreadsheet/CSV ingestion from object storage.
//!
//! Lists a bucket prefix, reads the CSV and Excel files a processed-file
//! ledger does not mention yet, concatenates them into one Arrow table and
//! records the successfully parsed names back in the ledger.
//!
//! # Example
//!
//! ```ignore
//! use sleet::{IngestRequest, StorageProvider, ingest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sleet::error::StorageError> {
//!     let storage = StorageProvider::for_url("gs://contabilidad-raw").await?;
//!     let request = IngestRequest::new("balanzas/2024", ".xlsx").with_file_prefix("BZ_");
//!     let report = ingest(&storage, &request).await;
//!     println!("{:?}: {} rows", report.outcome, report.table.num_rows());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod ingest;
pub mod ledger;
pub mod metrics;
pub mod sink;
pub mod source;
pub mod storage;
pub mod table;

// Re-export main types
pub use config::Config;
pub use ingest::{
    IngestOutcome, IngestReport, IngestRequest, extract_object, extract_object_auto, ingest, plan,
};
pub use ledger::{LEDGER_FILE_NAME, Ledger, LedgerWriteMode};
pub use source::{FileFormat, ReadOptions, SheetSelection};
pub use storage::{StorageProvider, StorageProviderRef};
