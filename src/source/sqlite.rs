//! SQLite-backed row source
//!
//! Exposes any table with an integer primary key as an [`Index`]. Every
//! selected column becomes a document field. When the table carries a
//! "changed" flag column, the index also supports changed-only export and
//! [`ChangedFlagReset`] clears the flags once an export completes.

use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::{Number, Value};
use std::cell::Cell;
use std::collections::HashMap;
use std::path::Path;

use crate::elasticsearch::{
    Document, ExportRows, Index, IndexExportedEvent, IndexExportedListener, RowId,
    SupportsChangesOnly, DEFAULT_EXPORT_BATCH_SIZE,
};

/// Ids bound per `IN (...)` lookup; stays below SQLite's host parameter limit
const MAX_BOUND_IDS: usize = 999;

/// Which table and columns back an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub table: String,
    pub id_column: String,
    /// Non-zero means "needs export"
    pub changed_column: Option<String>,
    /// Columns exported as fields; empty selects all
    pub columns: Vec<String>,
    pub batch_size: usize,
}

impl TableSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id_column: "id".to_string(),
            changed_column: None,
            columns: Vec::new(),
            batch_size: DEFAULT_EXPORT_BATCH_SIZE,
        }
    }

    pub fn with_changed_column(mut self, column: impl Into<String>) -> Self {
        self.changed_column = Some(column.into());
        self
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    fn validate(&self) -> Result<()> {
        validate_identifier(&self.table)?;
        validate_identifier(&self.id_column)?;
        if let Some(column) = &self.changed_column {
            validate_identifier(column)?;
        }
        for column in &self.columns {
            validate_identifier(column)?;
        }
        if self.batch_size == 0 {
            anyhow::bail!("batch_size of table {} must be greater than zero", self.table);
        }
        Ok(())
    }

    fn select_list(&self) -> String {
        if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| quote(c))
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

/// Table names come from configuration and are interpolated into SQL
fn validate_identifier(identifier: &str) -> Result<()> {
    let valid = !identifier.is_empty()
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        anyhow::bail!("Invalid SQL identifier: {:?}", identifier);
    }
    Ok(())
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}

/// One table exposed as an [`Index`]
pub struct SqliteIndex {
    name: String,
    conn: Connection,
    spec: TableSpec,
    query_logging: Cell<bool>,
}

impl SqliteIndex {
    /// Open the database file and expose `spec.table` as index `name`
    pub fn open<P: AsRef<Path>>(name: impl Into<String>, path: P, spec: TableSpec) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open SQLite database: {:?}", path.as_ref()))?;
        Self::from_connection(name, conn, spec)
    }

    /// Wrap an existing connection (e.g. an in-memory database)
    pub fn from_connection(name: impl Into<String>, conn: Connection, spec: TableSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            name: name.into(),
            conn,
            spec,
            query_logging: Cell::new(true),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn log_query(&self, sql: &str) {
        if self.query_logging.get() {
            tracing::trace!(target: "index_sync::sql", index = %self.name, sql);
        }
    }

    fn query_rows(&self, sql: &str, params: impl rusqlite::Params) -> Result<ExportRows> {
        self.log_query(sql);
        let mut stmt = self.conn.prepare_cached(sql)?;
        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = stmt.query(params)?;
        let mut export = ExportRows::new();
        while let Some(row) = rows.next()? {
            let id: RowId = row.get(0)?;
            let mut document = Document::new();
            // column 0 is the row id selected for keying
            for (i, name) in column_names.iter().enumerate().skip(1) {
                document.insert(name.clone(), to_json(row.get_ref(i)?));
            }
            export.insert(id, document);
        }
        Ok(export)
    }

    fn count(&self, sql: &str) -> Result<u64> {
        self.log_query(sql);
        let count: i64 = self
            .conn
            .prepare_cached(sql)?
            .query_row([], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl Index for SqliteIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn total_count(&self) -> Result<u64> {
        self.count(&format!("SELECT COUNT(*) FROM {}", quote(&self.spec.table)))
            .with_context(|| format!("Failed to count rows of {}", self.spec.table))
    }

    fn export_data_for_batch(&self, last_processed_id: RowId, batch_size: usize) -> Result<ExportRows> {
        let id = quote(&self.spec.id_column);
        let sql = format!(
            "SELECT {id}, {} FROM {} WHERE {id} > ?1 ORDER BY {id} LIMIT ?2",
            self.spec.select_list(),
            quote(&self.spec.table),
        );
        self.query_rows(&sql, params![last_processed_id, batch_size as i64])
            .with_context(|| format!("Failed to read batch from {}", self.spec.table))
    }

    fn export_data_for_ids(&self, ids: &[RowId]) -> Result<ExportRows> {
        if ids.is_empty() {
            return Ok(ExportRows::new());
        }

        let id = quote(&self.spec.id_column);
        let mut export = ExportRows::new();
        for chunk in ids.chunks(MAX_BOUND_IDS) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT {id}, {} FROM {} WHERE {id} IN ({placeholders}) ORDER BY {id}",
                self.spec.select_list(),
                quote(&self.spec.table),
            );
            let rows = self
                .query_rows(&sql, params_from_iter(chunk.iter()))
                .with_context(|| format!("Failed to read rows by id from {}", self.spec.table))?;
            export.extend(rows);
        }
        Ok(export)
    }

    fn export_batch_size(&self) -> usize {
        self.spec.batch_size
    }

    fn clear_cache(&self) {
        self.conn.flush_prepared_statement_cache();
    }

    fn set_query_logging(&self, enabled: bool) {
        self.query_logging.set(enabled);
    }

    fn query_logging(&self) -> bool {
        self.query_logging.get()
    }

    fn as_changes_only(&self) -> Option<&dyn SupportsChangesOnly> {
        self.spec.changed_column.as_ref().map(|_| self as &dyn SupportsChangesOnly)
    }
}

impl SupportsChangesOnly for SqliteIndex {
    fn changed_count(&self) -> Result<u64> {
        let changed = self.changed_column()?;
        self.count(&format!(
            "SELECT COUNT(*) FROM {} WHERE {changed} <> 0",
            quote(&self.spec.table)
        ))
    }

    fn changed_ids_for_batch(&self, last_processed_id: RowId, batch_size: usize) -> Result<Vec<RowId>> {
        let changed = self.changed_column()?;
        let id = quote(&self.spec.id_column);
        let sql = format!(
            "SELECT {id} FROM {} WHERE {changed} <> 0 AND {id} > ?1 ORDER BY {id} LIMIT ?2",
            quote(&self.spec.table)
        );

        self.log_query(&sql);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let ids = stmt
            .query_map(params![last_processed_id, batch_size as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<RowId>>>()
            .with_context(|| format!("Failed to read changed ids from {}", self.spec.table))?;
        Ok(ids)
    }
}

impl SqliteIndex {
    fn changed_column(&self) -> Result<String> {
        self.spec
            .changed_column
            .as_deref()
            .map(quote)
            .with_context(|| format!("Table {} has no changed column", self.spec.table))
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::String(blob.iter().map(|b| format!("{b:02x}")).collect()),
    }
}

/// Clears changed flags of a table after its index was exported.
pub struct ChangedFlagReset {
    conn: Connection,
    /// index name → (table, changed column)
    tables: HashMap<String, (String, String)>,
}

impl ChangedFlagReset {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open SQLite database: {:?}", path.as_ref()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            tables: HashMap::new(),
        }
    }

    /// Reset `spec.changed_column` whenever index `index_name` is exported.
    /// Specs without a changed column are ignored.
    pub fn watch(&mut self, index_name: &str, spec: &TableSpec) -> Result<()> {
        if let Some(column) = &spec.changed_column {
            validate_identifier(&spec.table)?;
            validate_identifier(column)?;
            self.tables
                .insert(index_name.to_string(), (spec.table.clone(), column.clone()));
        }
        Ok(())
    }

    pub fn is_watching(&self, index_name: &str) -> bool {
        self.tables.contains_key(index_name)
    }
}

impl IndexExportedListener for ChangedFlagReset {
    fn on_index_exported(&self, event: &IndexExportedEvent) -> Result<()> {
        let Some((table, column)) = self.tables.get(&event.index_name) else {
            return Ok(());
        };

        let column = quote(column);
        let reset = self
            .conn
            .execute(
                &format!("UPDATE {} SET {column} = 0 WHERE {column} <> 0", quote(table)),
                [],
            )
            .with_context(|| format!("Failed to reset changed flags of {table}"))?;

        tracing::debug!(index = %event.index_name, rows = reset, "changed flags reset");
        Ok(())
    }
}
