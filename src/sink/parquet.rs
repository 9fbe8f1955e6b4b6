//! Parquet output for the concatenated result table.
//!
//! The whole table is encoded in memory with `ArrowWriter` and uploaded as a
//! single object named by a time-ordered UUID.

use arrow::array::RecordBatch;
use bytes::Bytes;
use object_store::path::Path;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use snafu::prelude::*;
use tracing::info;
use uuid::Uuid;

use crate::config::ParquetCompression;
use crate::emit;
use crate::error::{ParquetWriteSnafu, SinkError, SinkUploadSnafu, WriterCreateSnafu};
use crate::metrics::events::ParquetFileWritten;
use crate::storage::StorageProvider;

use super::FinishedFile;

/// Writes result tables under a storage root.
#[derive(Debug, Clone)]
pub struct ParquetSink {
    storage: StorageProvider,
    compression: ParquetCompression,
}

impl ParquetSink {
    pub fn new(storage: StorageProvider, compression: ParquetCompression) -> Self {
        Self {
            storage,
            compression,
        }
    }

    /// Encode `batch` and upload it as `{uuid}.parquet`.
    pub async fn write(&self, batch: &RecordBatch, target: &str) -> Result<FinishedFile, SinkError> {
        let bytes = encode(batch, self.compression)?;
        let filename = generate_filename();
        let size = bytes.len();

        self.storage
            .put(&Path::from(filename.as_str()), bytes)
            .await
            .context(SinkUploadSnafu)?;

        info!(
            "Wrote {} rows ({} bytes) to {}/{}",
            batch.num_rows(),
            size,
            self.storage.canonical_url(),
            filename
        );
        emit!(ParquetFileWritten {
            bytes: size,
            target: target.to_string(),
        });

        Ok(FinishedFile {
            filename,
            size,
            record_count: batch.num_rows(),
        })
    }
}

/// Encode a batch as a complete Parquet file.
pub fn encode(batch: &RecordBatch, compression: ParquetCompression) -> Result<Bytes, SinkError> {
    let mut writer = ArrowWriter::try_new(
        Vec::new(),
        batch.schema(),
        Some(writer_properties(compression)),
    )
    .context(WriterCreateSnafu)?;

    writer.write(batch).context(ParquetWriteSnafu)?;
    let buffer = writer.into_inner().context(ParquetWriteSnafu)?;
    Ok(Bytes::from(buffer))
}

fn writer_properties(compression: ParquetCompression) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(match compression {
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ParquetCompression::Lz4 => Compression::LZ4,
        })
        .build()
}

fn generate_filename() -> String {
    format!("{}.parquet", Uuid::now_v7())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::sync::Arc;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("cuenta", DataType::Utf8, true),
            Field::new("file", DataType::Utf8, true),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec![Some("1001"), None])),
            Arc::new(StringArray::from(vec!["bz.csv", "bz.csv"])),
        ];
        RecordBatch::try_new(schema, columns).unwrap()
    }

    #[test]
    fn test_encode_is_readable() {
        for compression in [
            ParquetCompression::Uncompressed,
            ParquetCompression::Snappy,
            ParquetCompression::Zstd,
        ] {
            let bytes = encode(&batch(), compression).unwrap();
            let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)
                .unwrap()
                .build()
                .unwrap();
            let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
            assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 2);
        }
    }

    #[tokio::test]
    async fn test_write_uploads_under_root() {
        let storage = StorageProvider::for_url("memory://out").await.unwrap();
        let sink = ParquetSink::new(storage.clone(), ParquetCompression::Snappy);

        let finished = sink.write(&batch(), "test").await.unwrap();
        assert!(finished.filename.ends_with(".parquet"));
        assert_eq!(finished.record_count, 2);

        let listed = storage.list(&Path::from(""), true).await.unwrap();
        assert_eq!(listed, vec![Path::from(finished.filename.as_str())]);
        assert_eq!(
            storage.get(&listed[0]).await.unwrap().len(),
            finished.size
        );
    }
}
