//! Source side of an ingestion run: candidate discovery and table readers.

mod csv;
mod excel;
pub mod listing;
pub mod reader;

pub use self::csv::CsvReader;
pub use excel::ExcelReader;
pub use listing::{CandidateFile, CandidateFilter, discover, trailing_name};
pub use reader::{FileFormat, ReadOptions, SheetSelection, TableReader, read_table};
