//! Table reader abstraction.
//!
//! Maps a configured file type to a concrete [`TableReader`] and holds the
//! options passed through to it. Every reader produces a single
//! [`RecordBatch`] whose columns are nullable UTF-8 strings.

use arrow::array::{ArrayRef, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{ArrowSnafu, ReaderError};

use super::csv::CsvReader;
use super::excel::ExcelReader;

/// Options passed through to the table readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Field delimiter for delimited text (default: `,`, or tab for `.tsv`).
    #[serde(default)]
    pub delimiter: Option<char>,

    /// Whether the first (non-skipped) row holds column names (default: true).
    #[serde(default = "default_header")]
    pub header: bool,

    /// Rows to discard before the header, counted from the top of the file
    /// or sheet, blank rows included (default: 0).
    #[serde(default)]
    pub skip_rows: usize,

    /// Text encoding label for delimited text (default: "utf-8").
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Worksheet to read from a workbook (default: the first sheet).
    #[serde(default)]
    pub sheet: Option<SheetSelection>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            header: default_header(),
            skip_rows: 0,
            encoding: default_encoding(),
            sheet: None,
        }
    }
}

fn default_header() -> bool {
    true
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

/// Worksheet selector: zero-based position or name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SheetSelection {
    Index(usize),
    Name(String),
}

impl std::fmt::Display for SheetSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SheetSelection::Index(index) => write!(f, "#{index}"),
            SheetSelection::Name(name) => f.write_str(name),
        }
    }
}

/// File formats with a registered reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Comma-separated text.
    Csv,
    /// Tab-separated text.
    Tsv,
    /// Excel or OpenDocument workbook.
    Spreadsheet,
}

impl FileFormat {
    /// Pick the reader for a configured file type such as `.xlsx` or
    /// `_balanza.csv`. Returns `None` for types without a reader.
    pub fn from_file_type(file_type: &str) -> Option<Self> {
        let extension = file_type
            .rsplit('.')
            .next()
            .unwrap_or(file_type)
            .to_ascii_lowercase();

        match extension.as_str() {
            "csv" => Some(FileFormat::Csv),
            "tsv" => Some(FileFormat::Tsv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(FileFormat::Spreadsheet),
            _ => None,
        }
    }

    /// Build a reader for this format.
    pub fn reader(self, options: &ReadOptions) -> Box<dyn TableReader> {
        match self {
            FileFormat::Csv => Box::new(CsvReader::new(options.clone(), b',')),
            FileFormat::Tsv => Box::new(CsvReader::new(options.clone(), b'\t')),
            FileFormat::Spreadsheet => Box::new(ExcelReader::new(options.clone())),
        }
    }
}

/// Trait for decoding a downloaded file into a table.
pub trait TableReader: Send + Sync {
    /// Parse raw bytes into a record batch.
    ///
    /// # Arguments
    /// * `data` - The raw file contents
    /// * `path` - File path (used for error messages and logging)
    fn read(&self, data: Bytes, path: &str) -> Result<RecordBatch, ReaderError>;
}

/// Parse `data` with the reader registered for `format`.
pub fn read_table(
    format: FileFormat,
    data: Bytes,
    path: &str,
    options: &ReadOptions,
) -> Result<RecordBatch, ReaderError> {
    format.reader(options).read(data, path)
}

/// Derive column names from an optional header row.
///
/// Blank header cells become `Unnamed: {idx}`; repeated names get a `.N`
/// suffix (`a`, `a.1`, `a.2`). Without a header, columns are numbered.
pub(crate) fn column_names(header: Option<&[Option<String>]>, width: usize) -> Vec<String> {
    let Some(header) = header else {
        return (0..width).map(|i| i.to_string()).collect();
    };

    let raw: Vec<String> = (0..width)
        .map(|idx| match header.get(idx) {
            Some(Some(name)) if !name.trim().is_empty() => name.clone(),
            _ => format!("Unnamed: {idx}"),
        })
        .collect();

    let mut seen: HashSet<String> = HashSet::with_capacity(raw.len());
    let mut names = Vec::with_capacity(raw.len());
    for name in raw {
        let mut candidate = name.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{name}.{suffix}");
            suffix += 1;
        }
        seen.insert(candidate.clone());
        names.push(candidate);
    }
    names
}

/// Assemble row-major string cells into a batch of nullable UTF-8 columns.
pub(crate) fn build_batch(
    path: &str,
    names: Vec<String>,
    rows: &[Vec<Option<String>>],
) -> Result<RecordBatch, ReaderError> {
    let fields: Vec<Field> = names
        .iter()
        .map(|name| Field::new(name, DataType::Utf8, true))
        .collect();

    let columns: Vec<ArrayRef> = (0..names.len())
        .map(|col| {
            let array: StringArray = rows
                .iter()
                .map(|row| row.get(col).and_then(|cell| cell.as_deref()))
                .collect();
            Arc::new(array) as ArrayRef
        })
        .collect();

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context(ArrowSnafu {
        path: path.to_string(),
    })
}
