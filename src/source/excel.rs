//! Spreadsheet reader (xlsx, xlsm, xlsb, xls, ods).
//!
//! Opens the workbook in memory with `calamine`, picks the configured sheet
//! and renders each cell as a string.

use arrow::array::RecordBatch;
use bytes::Bytes;
use calamine::{Data, DataType, Reader, open_workbook_auto_from_rs};
use snafu::prelude::*;
use std::io::Cursor;
use tracing::debug;

use crate::error::{EmptyFileSnafu, ReaderError, SheetNotFoundSnafu, WorkbookSnafu};

use super::reader::{ReadOptions, SheetSelection, TableReader, build_batch, column_names};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Reader for Excel/OpenDocument workbooks.
pub struct ExcelReader {
    options: ReadOptions,
}

impl ExcelReader {
    pub fn new(options: ReadOptions) -> Self {
        Self { options }
    }
}

impl TableReader for ExcelReader {
    fn read(&self, data: Bytes, path: &str) -> Result<RecordBatch, ReaderError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(data)).context(WorkbookSnafu {
            path: path.to_string(),
        })?;

        let range = match &self.options.sheet {
            Some(SheetSelection::Name(name)) => {
                ensure!(
                    workbook.sheet_names().iter().any(|s| s == name),
                    SheetNotFoundSnafu {
                        path: path.to_string(),
                        sheet: name.clone(),
                    }
                );
                workbook.worksheet_range(name)
            }
            Some(SheetSelection::Index(index)) => {
                workbook
                    .worksheet_range_at(*index)
                    .context(SheetNotFoundSnafu {
                        path: path.to_string(),
                        sheet: index.to_string(),
                    })?
            }
            None => workbook.worksheet_range_at(0).context(SheetNotFoundSnafu {
                path: path.to_string(),
                sheet: "0".to_string(),
            })?,
        }
        .context(WorkbookSnafu {
            path: path.to_string(),
        })?;

        // `skip_rows` counts sheet rows from the top, but the range starts
        // at the first used row
        let first_used_row = range.start().map_or(0, |(row, _)| row as usize);
        let skip_in_range = self.options.skip_rows.saturating_sub(first_used_row);

        // Fully blank rows left after skipping carry no data
        let mut rows = range
            .rows()
            .skip(skip_in_range)
            .map(|row| row.iter().map(cell).collect::<Vec<_>>())
            .filter(|row| row.iter().any(Option::is_some));

        let first = rows.next().context(EmptyFileSnafu {
            path: path.to_string(),
        })?;
        let width = range.width();

        let (names, rows) = if self.options.header {
            (column_names(Some(first.as_slice()), width), rows.collect::<Vec<_>>())
        } else {
            let mut all = vec![first];
            all.extend(rows);
            (column_names(None, width), all)
        };

        debug!("Parsed {} rows x {} columns from {}", rows.len(), width, path);
        build_batch(path, names, &rows)
    }
}

/// Render a cell as text; empty and error cells are missing values.
fn cell(data: &Data) -> Option<String> {
    match data {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => (!s.is_empty()).then(|| s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(_) | Data::DateTimeIso(_) => Some(
            data.as_datetime()
                .map(|dt| dt.format(DATETIME_FORMAT).to_string())
                .unwrap_or_else(|| data.to_string()),
        ),
        Data::DurationIso(s) => Some(s.clone()),
    }
}
