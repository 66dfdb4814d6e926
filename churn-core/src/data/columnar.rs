//! Arrow / Parquet conversion for [`Dataset`].

use crate::data::dataset::{Column, ColumnData, Dataset};
use crate::error::ChurnError;
use arrow::array::{Array, ArrayRef, AsArray, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{
    DataType, Date32Type, Field, Float32Type, Float64Type, Int32Type, Int64Type, Schema, SchemaRef,
};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use bytes::Bytes;
use chrono::NaiveDate;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn date_to_days(date: NaiveDate) -> Result<i32, ChurnError> {
    i32::try_from(date.signed_duration_since(epoch()).num_days())
        .map_err(|_| ChurnError::schema(format!("date {date} is out of range for Date32")))
}

fn days_to_date(days: i32) -> Result<NaiveDate, ChurnError> {
    epoch()
        .checked_add_signed(chrono::TimeDelta::days(i64::from(days)))
        .ok_or_else(|| ChurnError::schema(format!("Date32 value {days} is out of range")))
}

fn data_type_of(data: &ColumnData) -> DataType {
    match data {
        ColumnData::Int64(_) => DataType::Int64,
        ColumnData::Float64(_) => DataType::Float64,
        ColumnData::Utf8(_) => DataType::Utf8,
        ColumnData::Date(_) => DataType::Date32,
    }
}

fn to_array(data: &ColumnData) -> Result<ArrayRef, ChurnError> {
    let array: ArrayRef = match data {
        ColumnData::Int64(v) => Arc::new(Int64Array::from(v.clone())),
        ColumnData::Float64(v) => Arc::new(Float64Array::from(v.clone())),
        ColumnData::Utf8(v) => Arc::new(StringArray::from(v.clone())),
        ColumnData::Date(v) => {
            let days = v
                .iter()
                .map(|d| d.map(date_to_days).transpose())
                .collect::<Result<Vec<_>, _>>()?;
            Arc::new(Date32Array::from(days))
        }
    };
    Ok(array)
}

fn from_array(name: &str, array: &dyn Array) -> Result<ColumnData, ChurnError> {
    let data = match array.data_type() {
        DataType::Int64 => ColumnData::Int64(array.as_primitive::<Int64Type>().iter().collect()),
        DataType::Int32 => ColumnData::Int64(
            array
                .as_primitive::<Int32Type>()
                .iter()
                .map(|v| v.map(i64::from))
                .collect(),
        ),
        DataType::Float64 => {
            ColumnData::Float64(array.as_primitive::<Float64Type>().iter().collect())
        }
        DataType::Float32 => ColumnData::Float64(
            array
                .as_primitive::<Float32Type>()
                .iter()
                .map(|v| v.map(f64::from))
                .collect(),
        ),
        DataType::Utf8 => ColumnData::Utf8(
            array
                .as_string::<i32>()
                .iter()
                .map(|v| v.map(str::to_string))
                .collect(),
        ),
        DataType::LargeUtf8 => ColumnData::Utf8(
            array
                .as_string::<i64>()
                .iter()
                .map(|v| v.map(str::to_string))
                .collect(),
        ),
        DataType::Date32 => ColumnData::Date(
            array
                .as_primitive::<Date32Type>()
                .iter()
                .map(|v| v.map(days_to_date).transpose())
                .collect::<Result<Vec<_>, _>>()?,
        ),
        other => {
            return Err(ChurnError::schema(format!(
                "column '{name}' has unsupported type {other}"
            )));
        }
    };
    Ok(data)
}

fn empty_data(name: &str, data_type: &DataType) -> Result<ColumnData, ChurnError> {
    let data = match data_type {
        DataType::Int64 | DataType::Int32 => ColumnData::Int64(Vec::new()),
        DataType::Float64 | DataType::Float32 => ColumnData::Float64(Vec::new()),
        DataType::Utf8 | DataType::LargeUtf8 => ColumnData::Utf8(Vec::new()),
        DataType::Date32 => ColumnData::Date(Vec::new()),
        other => {
            return Err(ChurnError::schema(format!(
                "column '{name}' has unsupported type {other}"
            )));
        }
    };
    Ok(data)
}

/// Arrow schema of a dataset; every field is nullable.
pub fn arrow_schema(dataset: &Dataset) -> SchemaRef {
    let fields: Vec<Field> = dataset
        .columns()
        .iter()
        .map(|c| Field::new(&c.name, data_type_of(&c.data), true))
        .collect();
    Arc::new(Schema::new(fields))
}

pub fn to_record_batch(dataset: &Dataset) -> Result<RecordBatch, ChurnError> {
    let arrays = dataset
        .columns()
        .iter()
        .map(|c| to_array(&c.data))
        .collect::<Result<Vec<_>, _>>()?;
    let options = RecordBatchOptions::new().with_row_count(Some(dataset.row_count()));
    Ok(RecordBatch::try_new_with_options(
        arrow_schema(dataset),
        arrays,
        &options,
    )?)
}

pub fn from_record_batch(batch: &RecordBatch) -> Result<Dataset, ChurnError> {
    let schema = batch.schema();
    let columns = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, array)| Ok(Column::new(field.name(), from_array(field.name(), array)?)))
        .collect::<Result<Vec<_>, ChurnError>>()?;
    Dataset::new(columns)
}

fn empty_dataset(schema: &Schema) -> Result<Dataset, ChurnError> {
    let columns = schema
        .fields()
        .iter()
        .map(|f| Ok(Column::new(f.name(), empty_data(f.name(), f.data_type())?)))
        .collect::<Result<Vec<_>, ChurnError>>()?;
    Dataset::new(columns)
}

/// Encode a dataset as a single Snappy-compressed parquet file.
pub fn encode_parquet(dataset: &Dataset) -> Result<Bytes, ChurnError> {
    let batch = to_record_batch(dataset)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(Bytes::from(buffer))
}

/// Decode a parquet file; row groups are concatenated in file order.
pub fn decode_parquet(data: Bytes) -> Result<Dataset, ChurnError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;
    let mut parts = Vec::new();
    for batch in reader {
        parts.push(from_record_batch(&batch?)?);
    }
    if parts.is_empty() {
        return empty_dataset(&schema);
    }
    Dataset::concat(parts)
}
