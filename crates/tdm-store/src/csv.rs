//! CSV checkpoint backend.
//!
//! One file per key under the store directory:
//!
//! | Key             | File                      |
//! |-----------------|---------------------------|
//! | `tours/init`    | `<dir>/tours/init.csv`    |
//! | `/tours`        | `<dir>/tours.csv`         |
//! | `checkpoints`   | `<dir>/checkpoints.csv`   |
//!
//! The header row carries types so tables read back exactly:
//!
//! ```csv
//! tour_id:index,person_id:int,tour_type:str,size_term:float,is_joint:bool
//! 1,10,work,5.5,false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use csv::{Reader, Writer};
use tracing::debug;

use tdm_core::{Column, DType, Table};

use crate::store::{CheckpointStore, validate_key};
use crate::{StoreError, StoreResult};

const INDEX_TAG: &str = "index";

/// Stores each table as a typed-header CSV file.
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    /// Use (and create if needed) `dir` as the store root.
    pub fn new(dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.csv", key.trim_start_matches('/'))))
    }
}

fn corrupt(key: &str, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt { key: key.to_owned(), reason: reason.into() }
}

impl CheckpointStore for CsvStore {
    fn write_table(&mut self, key: &str, table: &Table) -> StoreResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut w = Writer::from_path(&path)?;

        let mut header = Vec::with_capacity(table.width() + 1);
        header.push(format!("{}:{INDEX_TAG}", table.index_name()));
        header.extend(table.columns().map(|(name, col)| format!("{name}:{}", col.dtype())));
        w.write_record(&header)?;

        let mut record = Vec::with_capacity(header.len());
        for (row, id) in table.index().iter().enumerate() {
            record.clear();
            record.push(id.to_string());
            for (_, col) in table.columns() {
                record.push(col.get(row).map(|v| v.to_string()).unwrap_or_default());
            }
            w.write_record(&record)?;
        }
        w.flush()?;
        debug!(key, rows = table.len(), path = %path.display(), "csv table written");
        Ok(())
    }

    fn read_table(&self, key: &str) -> StoreResult<Table> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Err(StoreError::NotFound(key.to_owned()));
        }
        let mut rdr = Reader::from_path(&path)?;

        let headers = rdr.headers()?.clone();
        let mut cells = headers.iter();
        let index_name = cells
            .next()
            .and_then(|h| h.strip_suffix(INDEX_TAG))
            .and_then(|h| h.strip_suffix(':'))
            .ok_or_else(|| corrupt(key, "first header cell is not the index"))?
            .to_owned();

        let mut names = Vec::new();
        let mut columns = Vec::new();
        for cell in cells {
            let (name, dtype) = cell
                .rsplit_once(':')
                .ok_or_else(|| corrupt(key, format!("header '{cell}' has no type")))?;
            let dtype: DType = dtype.parse()?;
            names.push(name.to_owned());
            columns.push(Column::with_capacity(dtype, 0));
        }

        let mut index = Vec::new();
        for record in rdr.records() {
            let record = record?;
            if record.len() != columns.len() + 1 {
                return Err(corrupt(key, format!("row has {} cells, expected {}", record.len(), columns.len() + 1)));
            }
            index.push(
                record[0]
                    .parse::<i64>()
                    .map_err(|_| corrupt(key, format!("bad index value '{}'", &record[0])))?,
            );
            for (col, cell) in columns.iter_mut().zip(record.iter().skip(1)) {
                col.push_parsed(cell)?;
            }
        }

        let mut table = Table::new(index_name, index);
        for (name, col) in names.into_iter().zip(columns) {
            table.set_column(name, col)?;
        }
        Ok(table)
    }

    fn contains(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.exists()).unwrap_or(false)
    }

    fn close(&mut self) -> StoreResult<()> {
        Ok(())
    }
}
