//! Arrow/Parquet export of drawn points
//!
//! One row per drawn point, dequeue order, flat columns so that dataframe
//! tooling can plot the curve without parsing the text format.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, RecordBatch, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use crate::metrics::Metrics;
use crate::{Error, Result};

use super::DrawnRecord;

const METRIC_COLUMNS: [&str; 6] = [
    "train_correct",
    "train_abstained",
    "train_incorrect",
    "test_correct",
    "test_abstained",
    "test_incorrect",
];

fn schema() -> SchemaRef {
    let mut fields = vec![
        Field::new("location", DataType::UInt64, false),
        Field::new("checkpoint", DataType::Utf8, true),
        Field::new("error", DataType::Float64, false),
    ];
    fields.extend(
        METRIC_COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Float64, false)),
    );
    Arc::new(Schema::new(fields))
}

/// Build a record batch from drawn records.
///
/// # Errors
///
/// Returns an Arrow error if the batch cannot be assembled.
pub fn to_record_batch(records: &[DrawnRecord]) -> Result<RecordBatch> {
    let locations: Vec<u64> = records.iter().map(|r| r.location as u64).collect();
    let checkpoints: Vec<Option<&str>> = records.iter().map(|r| r.checkpoint.as_deref()).collect();
    let errors: Vec<f64> = records.iter().map(|r| r.error).collect();

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(locations)),
        Arc::new(StringArray::from(checkpoints)),
        Arc::new(Float64Array::from(errors)),
    ];
    for i in 0..METRIC_COLUMNS.len() {
        let values: Vec<f64> = records
            .iter()
            .map(|r| {
                let [train, test] = [r.train.to_array(), r.test.to_array()];
                if i < 3 {
                    train[i]
                } else {
                    test[i - 3]
                }
            })
            .collect();
        columns.push(Arc::new(Float64Array::from(values)));
    }

    Ok(RecordBatch::try_new(schema(), columns)?)
}

/// Write a batch as a single-row-group Parquet file.
///
/// # Errors
///
/// Returns a Parquet error if encoding or writing fails.
pub fn write_parquet(file: File, batch: &RecordBatch) -> Result<()> {
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Read records back from a Parquet file written by [`write_parquet`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or has a different schema.
pub fn read_parquet_records<P: AsRef<Path>>(path: P) -> Result<Vec<DrawnRecord>> {
    let file = File::open(path.as_ref())?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch?;
        let locations = column::<UInt64Array>(&batch, "location")?;
        let checkpoints = column::<StringArray>(&batch, "checkpoint")?;
        let errors = column::<Float64Array>(&batch, "error")?;
        let metrics = METRIC_COLUMNS
            .iter()
            .map(|name| column::<Float64Array>(&batch, name))
            .collect::<Result<Vec<_>>>()?;

        for row in 0..batch.num_rows() {
            let location = usize::try_from(locations.value(row))
                .map_err(|e| Error::StorageError(format!("location out of range: {e}")))?;
            let value = |c: usize| metrics[c].value(row);
            records.push(DrawnRecord {
                location,
                checkpoint: (!checkpoints.is_null(row)).then(|| checkpoints.value(row).to_string()),
                error: errors.value(row),
                train: Metrics::new(value(0), value(1), value(2)),
                test: Metrics::new(value(3), value(4), value(5)),
            });
        }
    }
    Ok(records)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| Error::StorageError(format!("missing or mistyped column '{name}'")))
}
