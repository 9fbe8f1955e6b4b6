//! Result table assembly.
//!
//! Per-file tables are tagged with their source name and stacked into one
//! batch. Columns are unioned by name in first-seen order; a file that lacks
//! a column contributes nulls for it.

use arrow::array::{ArrayRef, RecordBatch, StringArray, new_null_array};
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};
use snafu::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{AssembleSnafu, TableError};

/// Name of the column recording each row's source file.
pub const FILE_COLUMN: &str = "file";

/// A table with no columns and no rows.
pub fn empty_table() -> RecordBatch {
    RecordBatch::new_empty(Arc::new(Schema::empty()))
}

/// Append a `file` column holding `name` on every row, replacing any
/// existing `file` column.
pub fn with_file_column(batch: &RecordBatch, name: &str) -> Result<RecordBatch, TableError> {
    let schema = batch.schema();
    let (mut fields, mut columns): (Vec<FieldRef>, Vec<ArrayRef>) = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .filter(|(field, _)| field.name() != FILE_COLUMN)
        .map(|(field, column)| (Arc::clone(field), Arc::clone(column)))
        .unzip();

    fields.push(Arc::new(Field::new(FILE_COLUMN, DataType::Utf8, true)));
    columns.push(Arc::new(StringArray::from(vec![name; batch.num_rows()])));

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context(AssembleSnafu)
}

/// Union of the input schemas by column name, in first-seen order.
fn union_schema(tables: &[RecordBatch]) -> SchemaRef {
    let mut seen = HashSet::new();
    let fields: Vec<FieldRef> = tables
        .iter()
        .flat_map(|table| table.schema().fields().iter().cloned().collect::<Vec<_>>())
        .filter(|field| seen.insert(field.name().clone()))
        .map(|field| Arc::new(field.as_ref().clone().with_nullable(true)))
        .collect();
    Arc::new(Schema::new(fields))
}

/// Stack tables in order, unioning their columns.
pub fn concat_tables(tables: &[RecordBatch]) -> Result<RecordBatch, TableError> {
    if tables.is_empty() {
        return Ok(empty_table());
    }

    let schema = union_schema(tables);
    let aligned = tables
        .iter()
        .map(|table| {
            let columns: Vec<ArrayRef> = schema
                .fields()
                .iter()
                .map(|field| match table.column_by_name(field.name()) {
                    Some(column) => Arc::clone(column),
                    None => new_null_array(field.data_type(), table.num_rows()),
                })
                .collect();
            RecordBatch::try_new(Arc::clone(&schema), columns).context(AssembleSnafu)
        })
        .collect::<Result<Vec<_>, _>>()?;

    concat_batches(&schema, &aligned).context(AssembleSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};

    fn table(columns: &[(&str, &[Option<&str>])]) -> RecordBatch {
        let fields: Vec<Field> = columns
            .iter()
            .map(|(name, _)| Field::new(*name, DataType::Utf8, true))
            .collect();
        let arrays: Vec<ArrayRef> = columns
            .iter()
            .map(|(_, values)| Arc::new(StringArray::from(values.to_vec())) as ArrayRef)
            .collect();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
    }

    fn values(batch: &RecordBatch, name: &str) -> Vec<Option<String>> {
        let array = batch.column_by_name(name).unwrap().as_string::<i32>();
        (0..array.len())
            .map(|i| (!array.is_null(i)).then(|| array.value(i).to_string()))
            .collect()
    }

    #[test]
    fn test_empty_table() {
        let empty = empty_table();
        assert_eq!(empty.num_rows(), 0);
        assert_eq!(empty.num_columns(), 0);
        assert_eq!(concat_tables(&[]).unwrap().num_columns(), 0);
    }

    #[test]
    fn test_with_file_column_replaces_existing() {
        let batch = table(&[("file", &[Some("old")]), ("a", &[Some("1")])]);
        let tagged = with_file_column(&batch, "x.csv").unwrap();

        let names: Vec<&str> = tagged
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(names, vec!["a", "file"]);
        assert_eq!(values(&tagged, "file"), vec![Some("x.csv".to_string())]);
    }

    #[test]
    fn test_concat_unions_columns_in_first_seen_order() {
        let first = table(&[("a", &[Some("1"), Some("2")]), ("b", &[Some("x"), None])]);
        let second = table(&[("c", &[Some("z")]), ("a", &[Some("3")])]);

        let result = concat_tables(&[first, second]).unwrap();
        let names: Vec<&str> = result
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(result.num_rows(), 3);
        assert_eq!(
            values(&result, "a"),
            vec![Some("1".into()), Some("2".into()), Some("3".into())]
        );
        assert_eq!(values(&result, "b"), vec![Some("x".into()), None, None]);
        assert_eq!(values(&result, "c"), vec![None, None, Some("z".into())]);
    }
}
