//! Delimited text reader.
//!
//! Decodes the raw bytes with the configured encoding, splits them with the
//! `csv` crate and lays the records out as nullable string columns.

use arrow::array::RecordBatch;
use bytes::Bytes;
use encoding_rs::Encoding;
use snafu::prelude::*;
use tracing::debug;

use crate::error::{
    CsvSnafu, DecodeSnafu, EmptyFileSnafu, RaggedRowSnafu, ReaderError, UnknownEncodingSnafu,
    UnsupportedDelimiterSnafu,
};

use super::reader::{ReadOptions, TableReader, build_batch, column_names};

/// Reader for comma/tab separated text.
pub struct CsvReader {
    options: ReadOptions,
    default_delimiter: u8,
}

impl CsvReader {
    /// Create a reader; `default_delimiter` applies when the options set none.
    pub fn new(options: ReadOptions, default_delimiter: u8) -> Self {
        Self {
            options,
            default_delimiter,
        }
    }

    fn delimiter(&self) -> Result<u8, ReaderError> {
        match self.options.delimiter {
            None => Ok(self.default_delimiter),
            Some(c) if c.is_ascii() => Ok(c as u8),
            Some(delimiter) => UnsupportedDelimiterSnafu { delimiter }.fail(),
        }
    }

    fn decode(&self, data: &[u8], path: &str) -> Result<String, ReaderError> {
        let label = self.options.encoding.trim();
        let encoding = Encoding::for_label(label.as_bytes()).context(UnknownEncodingSnafu {
            label: label.to_string(),
        })?;

        let (text, had_errors) = encoding.decode_with_bom_removal(data);
        ensure!(
            !had_errors,
            DecodeSnafu {
                path: path.to_string(),
                encoding: encoding.name().to_string(),
            }
        );
        Ok(text.into_owned())
    }
}

impl TableReader for CsvReader {
    fn read(&self, data: Bytes, path: &str) -> Result<RecordBatch, ReaderError> {
        let delimiter = self.delimiter()?;
        let text = self.decode(&data, path)?;

        let skip_rows = self.options.skip_rows;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(skip_lines(&text, skip_rows).as_bytes());

        let mut records = reader.records();

        let first = records
            .next()
            .transpose()
            .context(CsvSnafu {
                path: path.to_string(),
            })?
            .context(EmptyFileSnafu {
                path: path.to_string(),
            })?;

        let first: Vec<Option<String>> = first.iter().map(cell).collect();
        let width = first.len();

        let (names, mut rows) = if self.options.header {
            (column_names(Some(first.as_slice()), width), Vec::new())
        } else {
            (column_names(None, width), vec![first])
        };

        for record in records {
            let record = record.context(CsvSnafu {
                path: path.to_string(),
            })?;
            ensure!(
                record.len() <= width,
                RaggedRowSnafu {
                    path: path.to_string(),
                    line: record.position().map(|p| p.line()).unwrap_or_default()
                        + skip_rows as u64,
                    expected: width,
                    found: record.len(),
                }
            );
            rows.push(record.iter().map(cell).collect());
        }

        debug!("Parsed {} rows x {} columns from {}", rows.len(), width, path);
        build_batch(path, names, &rows)
    }
}

/// Drop the first `n` physical lines; the csv parser itself ignores blank
/// lines, so they have to go before it sees the text.
fn skip_lines(text: &str, n: usize) -> &str {
    let mut rest = text;
    for _ in 0..n {
        match rest.find('\n') {
            Some(end) => rest = &rest[end + 1..],
            None => return "",
        }
    }
    rest
}

/// Empty fields are missing values.
fn cell(field: &str) -> Option<String> {
    (!field.is_empty()).then(|| field.to_string())
}
