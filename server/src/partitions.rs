//! Parquet partition files.
//!
//! Writers drop small uniquely named partitions into a directory; a later
//! pass concatenates them into one file and removes the inputs.

use arrow_array::RecordBatch;
use arrow_schema::{ArrowError, SchemaRef};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::errors::ParquetError;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

const PARQUET_EXTENSION: &str = "parquet";

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("schema of {} does not match the first partition", .0.display())]
    SchemaMismatch(PathBuf),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PartitionError + '_ {
    move |source| PartitionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `batch` as a new partition file in `partition_dir`, creating the
/// directory if needed. Returns the path of the new file.
pub fn write_partition(batch: &RecordBatch, partition_dir: &Path) -> Result<PathBuf, PartitionError> {
    std::fs::create_dir_all(partition_dir).map_err(io_error(partition_dir))?;

    let path = partition_dir.join(format!("{}.{}", Uuid::new_v4().simple(), PARQUET_EXTENSION));
    let file = File::create(&path).map_err(io_error(&path))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;

    tracing::info!(path = %path.display(), rows = batch.num_rows(), "Partition written");
    Ok(path)
}

/// Partition files in `partition_dir`, sorted by name.
fn list_partitions(partition_dir: &Path, exclude: &Path) -> Result<Vec<PathBuf>, PartitionError> {
    let entries = std::fs::read_dir(partition_dir).map_err(io_error(partition_dir))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(io_error(partition_dir))?.path();
        let is_parquet = path.extension().is_some_and(|ext| ext == PARQUET_EXTENSION);
        if is_parquet && path.is_file() && path != exclude {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_partition(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>), PartitionError> {
    let file = File::open(path).map_err(io_error(path))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let batches = builder.build()?.collect::<Result<Vec<_>, ArrowError>>()?;
    Ok((schema, batches))
}

/// Concatenate every `*.parquet` file in `partition_dir` into `output_path`,
/// then delete the inputs. Returns the number of rows written.
///
/// An empty directory is a no-op and returns 0. All partitions must share the
/// first partition's fields; otherwise nothing is written or deleted.
pub fn combine_partitions(partition_dir: &Path, output_path: &Path) -> Result<usize, PartitionError> {
    let files = list_partitions(partition_dir, output_path)?;
    if files.is_empty() {
        tracing::info!(dir = %partition_dir.display(), "No partition files to combine");
        return Ok(0);
    }

    let mut schema: Option<SchemaRef> = None;
    let mut batches = Vec::new();
    for path in &files {
        let (file_schema, file_batches) = read_partition(path)?;
        match &schema {
            Some(first) if first.fields() != file_schema.fields() => {
                return Err(PartitionError::SchemaMismatch(path.clone()));
            }
            Some(_) => {}
            None => schema = Some(file_schema),
        }
        batches.extend(file_batches);
    }

    let Some(schema) = schema else {
        return Ok(0);
    };

    let file = File::create(output_path).map_err(io_error(output_path))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    let mut rows = 0;
    for batch in &batches {
        writer.write(batch)?;
        rows += batch.num_rows();
    }
    writer.close()?;

    for path in &files {
        std::fs::remove_file(path).map_err(io_error(path))?;
    }

    tracing::info!(
        output = %output_path.display(),
        partitions = files.len(),
        rows,
        "Combined partitions"
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Int64Array, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use std::sync::Arc;

    fn int_batch(a: &[i64], b: &[i64]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("A", DataType::Int64, false),
            Field::new("B", DataType::Int64, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(a.to_vec())),
                Arc::new(Int64Array::from(b.to_vec())),
            ],
        )
        .unwrap()
    }

    fn read_column(path: &Path, col: usize) -> Vec<i64> {
        let (_, batches) = read_partition(path).unwrap();
        batches
            .iter()
            .flat_map(|batch| {
                batch
                    .column(col)
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .unwrap()
                    .values()
                    .to_vec()
            })
            .collect()
    }

    #[test]
    fn test_combine_two_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let partitions = dir.path().join("partitions");
        write_partition(&int_batch(&[1, 2], &[3, 4]), &partitions).unwrap();
        write_partition(&int_batch(&[5, 6], &[7, 8]), &partitions).unwrap();

        let output = dir.path().join("data.parquet");
        let rows = combine_partitions(&partitions, &output).unwrap();
        assert_eq!(rows, 4);

        let mut a = read_column(&output, 0);
        a.sort();
        assert_eq!(a, vec![1, 2, 5, 6]);
        assert_eq!(std::fs::read_dir(&partitions).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_directory_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("data.parquet");

        assert_eq!(combine_partitions(dir.path(), &output).unwrap(), 0);
        assert!(!output.exists());
    }

    #[test]
    fn test_non_parquet_files_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        write_partition(&int_batch(&[1], &[2]), dir.path()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        let output = dir.path().join("combined.parquet");
        assert_eq!(combine_partitions(dir.path(), &output).unwrap(), 1);
        assert!(dir.path().join("notes.txt").exists());
        assert!(output.exists());
    }

    #[test]
    fn test_schema_mismatch_keeps_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let partitions = dir.path().join("partitions");
        write_partition(&int_batch(&[1], &[2]), &partitions).unwrap();

        let other = RecordBatch::try_new(
            Arc::new(Schema::new(vec![Field::new("name", DataType::Utf8, false)])),
            vec![Arc::new(StringArray::from(vec!["x"]))],
        )
        .unwrap();
        write_partition(&other, &partitions).unwrap();

        let output = dir.path().join("data.parquet");
        let err = combine_partitions(&partitions, &output).unwrap_err();
        assert!(matches!(err, PartitionError::SchemaMismatch(_)));
        assert!(!output.exists());
        assert_eq!(std::fs::read_dir(&partitions).unwrap().count(), 2);
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = combine_partitions(&dir.path().join("absent"), &dir.path().join("out.parquet"))
            .unwrap_err();
        assert!(matches!(err, PartitionError::Io { .. }));
    }
}
