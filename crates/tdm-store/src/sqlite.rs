//! SQLite checkpoint backend (feature `sqlite`).
//!
//! Creates a single `pipeline.db` file in the store directory.  Each key
//! becomes one SQL table (named by the quoted key) with an `__index` column
//! followed by the data columns; `_tables` records the index name and the
//! column types so a table reads back with its original dtypes.

use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use tdm_core::{Column, DType, Table};

use crate::store::{CheckpointStore, validate_key};
use crate::{StoreError, StoreResult};

/// Stores checkpointed tables in one SQLite database.
pub struct SqliteStore {
    conn:   Connection,
    closed: bool,
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn sql_type(dtype: DType) -> &'static str {
    match dtype {
        DType::Int | DType::Bool => "INTEGER",
        DType::Float             => "REAL",
        DType::Str               => "TEXT",
    }
}

impl SqliteStore {
    /// Open (or create) `pipeline.db` in `dir`.
    pub fn new(dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join("pipeline.db"))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             CREATE TABLE IF NOT EXISTS _tables (
                 key        TEXT PRIMARY KEY,
                 index_name TEXT NOT NULL,
                 schema     TEXT NOT NULL
             );",
        )?;
        Ok(Self { conn, closed: false })
    }
}

impl CheckpointStore for SqliteStore {
    fn write_table(&mut self, key: &str, table: &Table) -> StoreResult<()> {
        validate_key(key)?;
        let schema: Vec<String> = table.columns().map(|(n, c)| format!("{n}:{}", c.dtype())).collect();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote(key)))?;

        let mut defs = vec!["__index INTEGER NOT NULL".to_owned()];
        defs.extend(table.columns().map(|(n, c)| format!("{} {}", quote(n), sql_type(c.dtype()))));
        tx.execute_batch(&format!("CREATE TABLE {} ({})", quote(key), defs.join(", ")))?;

        {
            let placeholders: Vec<String> = (1..=table.width() + 1).map(|i| format!("?{i}")).collect();
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} VALUES ({})",
                quote(key),
                placeholders.join(", ")
            ))?;
            for (row, id) in table.index().iter().enumerate() {
                let mut values = Vec::with_capacity(table.width() + 1);
                values.push(SqlValue::Integer(*id));
                for (_, col) in table.columns() {
                    values.push(match col {
                        Column::Int(v)   => SqlValue::Integer(v[row]),
                        Column::Bool(v)  => SqlValue::Integer(v[row] as i64),
                        Column::Float(v) if v[row].is_nan() => SqlValue::Null,
                        Column::Float(v) => SqlValue::Real(v[row]),
                        Column::Str(v)   => SqlValue::Text(v[row].clone()),
                    });
                }
                stmt.execute(rusqlite::params_from_iter(values))?;
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO _tables (key, index_name, schema) VALUES (?1, ?2, ?3)",
            params![key, table.index_name(), schema.join(",")],
        )?;
        tx.commit()?;
        debug!(key, rows = table.len(), "sqlite table written");
        Ok(())
    }

    fn read_table(&self, key: &str) -> StoreResult<Table> {
        let meta: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT index_name, schema FROM _tables WHERE key = ?1",
                params![key],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((index_name, schema)) = meta else {
            return Err(StoreError::NotFound(key.to_owned()));
        };

        let mut names = Vec::new();
        let mut columns = Vec::new();
        for entry in schema.split(',').filter(|e| !e.is_empty()) {
            let (name, dtype) = entry.rsplit_once(':').ok_or_else(|| StoreError::Corrupt {
                key:    key.to_owned(),
                reason: format!("bad schema entry '{entry}'"),
            })?;
            names.push(name.to_owned());
            columns.push(Column::with_capacity(dtype.parse()?, 0));
        }

        let mut stmt = self.conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", quote(key)))?;
        let mut rows = stmt.query([])?;
        let mut index = Vec::new();
        while let Some(row) = rows.next()? {
            index.push(row.get::<_, i64>(0)?);
            for (i, col) in columns.iter_mut().enumerate() {
                match col {
                    Column::Int(v)   => v.push(row.get(i + 1)?),
                    Column::Bool(v)  => v.push(row.get::<_, i64>(i + 1)? != 0),
                    Column::Float(v) => v.push(row.get::<_, Option<f64>>(i + 1)?.unwrap_or(f64::NAN)),
                    Column::Str(v)   => v.push(row.get(i + 1)?),
                }
            }
        }

        let mut table = Table::new(index_name, index);
        for (name, col) in names.into_iter().zip(columns) {
            table.set_column(name, col)?;
        }
        Ok(table)
    }

    fn contains(&self, key: &str) -> bool {
        self.conn
            .query_row("SELECT 1 FROM _tables WHERE key = ?1", params![key], |_| Ok(()))
            .optional()
            .map(|found| found.is_some())
            .unwrap_or(false)
    }

    fn close(&mut self) -> StoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}
