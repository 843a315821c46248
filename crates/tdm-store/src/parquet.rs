//! Parquet checkpoint backend (feature `parquet`).
//!
//! Same directory layout as the CSV backend with `.parquet` files.  The row
//! index is written as an `Int64` column named `__index`; its original name
//! is kept in the Arrow schema metadata under `index_name`.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use tdm_core::{Column, Table};

use crate::store::{CheckpointStore, validate_key};
use crate::{StoreError, StoreResult};

const INDEX_COLUMN: &str = "__index";
const INDEX_NAME_KEY: &str = "index_name";

fn snappy_props() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build()
}

/// Stores each table as a Parquet file.
pub struct ParquetStore {
    dir: PathBuf,
}

impl ParquetStore {
    pub fn new(dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.parquet", key.trim_start_matches('/'))))
    }
}

fn to_arrow(col: &Column) -> (DataType, ArrayRef) {
    match col {
        Column::Int(v)   => (DataType::Int64, Arc::new(Int64Array::from(v.clone()))),
        Column::Float(v) => (DataType::Float64, Arc::new(Float64Array::from(v.clone()))),
        Column::Str(v)   => (DataType::Utf8, Arc::new(StringArray::from_iter_values(v.iter()))),
        Column::Bool(v)  => (DataType::Boolean, Arc::new(BooleanArray::from(v.clone()))),
    }
}

fn from_arrow(key: &str, name: &str, array: &dyn Array) -> StoreResult<Column> {
    let corrupt = |reason: &str| StoreError::Corrupt { key: key.to_owned(), reason: format!("{name}: {reason}") };
    let any = array.as_any();
    let col = match array.data_type() {
        DataType::Int64 => {
            let a = any.downcast_ref::<Int64Array>().ok_or_else(|| corrupt("not Int64"))?;
            Column::Int(a.values().to_vec())
        }
        DataType::Float64 => {
            let a = any.downcast_ref::<Float64Array>().ok_or_else(|| corrupt("not Float64"))?;
            Column::Float(a.values().to_vec())
        }
        DataType::Utf8 => {
            let a = any.downcast_ref::<StringArray>().ok_or_else(|| corrupt("not Utf8"))?;
            Column::Str((0..a.len()).map(|i| a.value(i).to_owned()).collect())
        }
        DataType::Boolean => {
            let a = any.downcast_ref::<BooleanArray>().ok_or_else(|| corrupt("not Boolean"))?;
            Column::Bool((0..a.len()).map(|i| a.value(i)).collect())
        }
        other => return Err(corrupt(&format!("unsupported type {other}"))),
    };
    Ok(col)
}

impl CheckpointStore for ParquetStore {
    fn write_table(&mut self, key: &str, table: &Table) -> StoreResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut fields = vec![Field::new(INDEX_COLUMN, DataType::Int64, false)];
        let mut arrays: Vec<ArrayRef> = vec![Arc::new(Int64Array::from(table.index().to_vec()))];
        for (name, col) in table.columns() {
            let (dtype, array) = to_arrow(col);
            fields.push(Field::new(name, dtype, false));
            arrays.push(array);
        }
        let metadata = HashMap::from([(INDEX_NAME_KEY.to_owned(), table.index_name().to_owned())]);
        let schema = Arc::new(Schema::new_with_metadata(fields, metadata));

        let batch = RecordBatch::try_new(Arc::clone(&schema), arrays)?;
        let mut writer = ArrowWriter::try_new(File::create(&path)?, schema, Some(snappy_props()))?;
        writer.write(&batch)?;
        writer.close()?;
        debug!(key, rows = table.len(), path = %path.display(), "parquet table written");
        Ok(())
    }

    fn read_table(&self, key: &str) -> StoreResult<Table> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Err(StoreError::NotFound(key.to_owned()));
        }
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?;
        let schema = Arc::clone(builder.schema());
        let index_name = schema.metadata().get(INDEX_NAME_KEY).cloned().unwrap_or_default();

        let mut parts: Vec<Table> = Vec::new();
        for batch in builder.build()? {
            let batch = batch?;
            let index = match from_arrow(key, INDEX_COLUMN, batch.column(0).as_ref())? {
                Column::Int(v) => v,
                _ => {
                    return Err(StoreError::Corrupt { key: key.to_owned(), reason: "index is not Int64".into() });
                }
            };
            let mut part = Table::new(index_name.clone(), index);
            for (field, array) in schema.fields().iter().zip(batch.columns()).skip(1) {
                part.set_column(field.name().clone(), from_arrow(key, field.name(), array.as_ref())?)?;
            }
            parts.push(part);
        }

        if parts.is_empty() {
            let mut empty = Table::new(index_name, Vec::new());
            for field in schema.fields().iter().skip(1) {
                let dtype = match field.data_type() {
                    DataType::Int64   => tdm_core::DType::Int,
                    DataType::Float64 => tdm_core::DType::Float,
                    DataType::Boolean => tdm_core::DType::Bool,
                    _                 => tdm_core::DType::Str,
                };
                empty.set_column(field.name().clone(), Column::with_capacity(dtype, 0))?;
            }
            return Ok(empty);
        }
        let mut table = Table::concat(parts)?;
        table.set_index_name(index_name);
        Ok(table)
    }

    fn contains(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.exists()).unwrap_or(false)
    }

    fn close(&mut self) -> StoreResult<()> {
        Ok(())
    }
}
