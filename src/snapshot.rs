//! Scored-payments snapshot: fetching the parquet object and decoding it into
//! a column-oriented table that the rest of the report reads from.

use std::path::PathBuf;

use anyhow::Context;
use arrow::array::{new_empty_array, Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type, TimeUnit};
use arrow::util::display::array_value_to_string;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::{debug, info};

use crate::error::SnapshotError;

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int(values) => values.len(),
            ColumnData::Float(values) => values.len(),
            ColumnData::Timestamp(values) => values.len(),
            ColumnData::Text(values) => values.len(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnData::Int(_) | ColumnData::Float(_))
    }

    /// Integer view of a cell. Floats are truncated and text is parsed;
    /// non-finite floats have no integer value.
    pub fn int_at(&self, row: usize) -> Option<i64> {
        match self {
            ColumnData::Int(values) => values.get(row).copied().flatten(),
            ColumnData::Float(values) => values
                .get(row)
                .copied()
                .flatten()
                .filter(|value| value.is_finite())
                .map(|value| value.trunc() as i64),
            ColumnData::Text(values) => values
                .get(row)
                .and_then(|value| value.as_deref())
                .and_then(|value| value.trim().parse().ok()),
            ColumnData::Timestamp(_) => None,
        }
    }

    pub fn float_at(&self, row: usize) -> Option<f64> {
        match self {
            ColumnData::Int(values) => values.get(row).copied().flatten().map(|v| v as f64),
            ColumnData::Float(values) => values.get(row).copied().flatten(),
            ColumnData::Text(values) => values
                .get(row)
                .and_then(|value| value.as_deref())
                .and_then(|value| value.trim().parse().ok()),
            ColumnData::Timestamp(_) => None,
        }
    }

    pub fn text_at(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Int(values) => values.get(row).copied().flatten().map(|v| v.to_string()),
            ColumnData::Float(values) => values.get(row).copied().flatten().map(|v| v.to_string()),
            ColumnData::Timestamp(values) => values
                .get(row)
                .copied()
                .flatten()
                .map(|v| v.format("%Y-%m-%d %H:%M:%S").to_string()),
            ColumnData::Text(values) => values.get(row).cloned().flatten(),
        }
    }

    fn extend(&mut self, other: ColumnData) -> bool {
        match (self, other) {
            (ColumnData::Int(a), ColumnData::Int(b)) => a.extend(b),
            (ColumnData::Float(a), ColumnData::Float(b)) => a.extend(b),
            (ColumnData::Timestamp(a), ColumnData::Timestamp(b)) => a.extend(b),
            (ColumnData::Text(a), ColumnData::Text(b)) => a.extend(b),
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    columns: Vec<Column>,
    rows: usize,
}

impl RawTable {
    pub fn new(columns: Vec<Column>) -> Result<Self, SnapshotError> {
        let rows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        for column in &columns {
            if column.data.len() != rows {
                return Err(SnapshotError::RaggedColumn {
                    column: column.name.clone(),
                    expected: rows,
                    actual: column.data.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

/// Where the snapshot object lives.
#[derive(Debug, Clone)]
pub enum SnapshotSource {
    S3 {
        client: S3Client,
        bucket: String,
        key: String,
    },
    File(PathBuf),
}

impl SnapshotSource {
    pub async fn s3(bucket: &str, key: &str) -> Self {
        let aws_conf = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        SnapshotSource::S3 {
            client: S3Client::new(&aws_conf),
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    pub fn location(&self) -> String {
        match self {
            SnapshotSource::S3 { bucket, key, .. } => format!("s3://{bucket}/{key}"),
            SnapshotSource::File(path) => path.display().to_string(),
        }
    }

    pub async fn fetch(&self) -> anyhow::Result<Bytes> {
        let bytes = match self {
            SnapshotSource::S3 {
                client,
                bucket,
                key,
            } => {
                let resp = client
                    .get_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .with_context(|| format!("failed to download s3://{bucket}/{key}"))?;
                resp.body
                    .collect()
                    .await
                    .context("failed to read S3 object body")?
                    .into_bytes()
            }
            SnapshotSource::File(path) => Bytes::from(
                tokio::fs::read(path)
                    .await
                    .with_context(|| format!("failed to read snapshot {}", path.display()))?,
            ),
        };

        info!(location = %self.location(), bytes = bytes.len(), "snapshot fetched");
        Ok(bytes)
    }
}

pub fn decode(bytes: Bytes) -> anyhow::Result<RawTable> {
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(bytes).context("parquet reader init failed")?;
    let schema = builder.schema().clone();

    let mut columns = schema
        .fields()
        .iter()
        .map(|field| {
            let empty = new_empty_array(field.data_type());
            let data = convert_array(&empty)
                .with_context(|| format!("unsupported column `{}`", field.name()))?;
            Ok(Column::new(field.name().clone(), data))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let reader = builder.build().context("parquet reader build failed")?;
    for batch in reader {
        let batch = batch.context("parquet read batch failed")?;
        for (idx, column) in columns.iter_mut().enumerate() {
            let chunk = convert_array(batch.column(idx))
                .with_context(|| format!("failed to decode column `{}`", column.name))?;
            if !column.data.extend(chunk) {
                anyhow::bail!("column `{}` changes type between batches", column.name);
            }
        }
    }

    let table = RawTable::new(columns)?;
    debug!(rows = table.len(), columns = table.columns().len(), "snapshot decoded");
    Ok(table)
}

fn convert_array(array: &ArrayRef) -> anyhow::Result<ColumnData> {
    let data = match array.data_type() {
        DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => {
            let ints = cast(array, &DataType::Int64)?;
            ColumnData::Int(ints.as_primitive::<Int64Type>().iter().collect())
        }
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => {
            let floats = cast(array, &DataType::Float64)?;
            ColumnData::Float(floats.as_primitive::<Float64Type>().iter().collect())
        }
        DataType::Timestamp(unit, _) => {
            let raw = cast(array, &DataType::Int64)?;
            let unit = *unit;
            ColumnData::Timestamp(
                raw.as_primitive::<Int64Type>()
                    .iter()
                    .map(|value| value.and_then(|v| timestamp_from_unit(v, unit)))
                    .collect(),
            )
        }
        _ => match cast(array, &DataType::Utf8) {
            Ok(strings) => ColumnData::Text(
                strings
                    .as_string::<i32>()
                    .iter()
                    .map(|value| value.map(str::to_string))
                    .collect(),
            ),
            Err(_) => ColumnData::Text(
                (0..array.len())
                    .map(|row| {
                        if array.is_null(row) {
                            None
                        } else {
                            array_value_to_string(array.as_ref(), row).ok()
                        }
                    })
                    .collect(),
            ),
        },
    };
    Ok(data)
}

fn timestamp_from_unit(value: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let time = match unit {
        TimeUnit::Second => DateTime::from_timestamp(value, 0)?,
        TimeUnit::Millisecond => DateTime::from_timestamp_millis(value)?,
        TimeUnit::Microsecond => DateTime::from_timestamp_micros(value)?,
        TimeUnit::Nanosecond => DateTime::from_timestamp_nanos(value),
    };
    Some(time.naive_utc())
}
