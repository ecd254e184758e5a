//! SQLite Store - uploaded tables, their context and read-only execution
//!
//! Architecture: one `rusqlite` connection behind a `Mutex`. Every uploaded
//! file becomes its own table; questions are answered against exactly one.

use crate::db::ingest::{self, TabularData};
use crate::error::{Nl2SqlError, Result};
use crate::execution::{QueryResult, StatementRunner, TableContextSource};
use crate::sanitizer::ValidatedQuery;
use crate::table_context::{ColumnInfo, SampleRow, TableContext};
use async_trait::async_trait;
use itertools::Itertools;
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info};

pub struct SqliteStore {
    db: Mutex<Connection>,
    sample_limit: usize,
}

impl SqliteStore {
    pub const DEFAULT_SAMPLE_LIMIT: usize = 20;

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Connection::open(path)
            .map_err(|e| Nl2SqlError::Database(format!("Failed to open database: {}", e)))?;
        info!("Opened table store at {}", path.display());
        Ok(Self::from_connection(db))
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()
            .map_err(|e| Nl2SqlError::Database(format!("Failed to open database: {}", e)))?;
        Ok(Self::from_connection(db))
    }

    fn from_connection(db: Connection) -> Self {
        Self {
            db: Mutex::new(db),
            sample_limit: Self::DEFAULT_SAMPLE_LIMIT,
        }
    }

    /// Rows returned as samples by `get_table_context`.
    pub fn with_sample_limit(mut self, sample_limit: usize) -> Self {
        self.sample_limit = sample_limit;
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| Nl2SqlError::Database("database lock poisoned".to_string()))
    }

    /// Ingest a `.csv` file or a `.json` array of objects.
    pub fn create_table_from_file(&self, path: impl AsRef<Path>) -> Result<TableContext> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        let data = match extension.as_str() {
            "csv" => ingest::read_csv(path)?,
            "json" => ingest::read_json(path)?,
            _ => {
                return Err(Nl2SqlError::Ingestion(format!(
                    "Unsupported file type: {}",
                    path.display()
                )))
            }
        };

        self.create_table(&ingest::generate_table_name(&file_name(path)), data)
    }

    pub fn create_table_from_csv(&self, path: impl AsRef<Path>) -> Result<TableContext> {
        let path = path.as_ref();
        let data = ingest::read_csv(path)?;
        self.create_table(&ingest::generate_table_name(&file_name(path)), data)
    }

    pub fn create_table_from_json(&self, rows: &[Value], filename: &str) -> Result<TableContext> {
        let data = ingest::rows_from_json(rows)?;
        self.create_table(&ingest::generate_table_name(filename), data)
    }

    fn create_table(&self, table_name: &str, data: TabularData) -> Result<TableContext> {
        let types = data.column_types();
        let column_defs = data
            .headers
            .iter()
            .zip(&types)
            .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.as_sql()))
            .join(", ");
        let placeholders = (1..=data.headers.len()).map(|i| format!("?{}", i)).join(", ");
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table_name),
            data.headers.iter().map(|h| quote_ident(h)).join(", "),
            placeholders
        );

        {
            let mut db = self.conn()?;
            let tx = db
                .transaction()
                .map_err(|e| Nl2SqlError::Database(format!("Failed to start transaction: {}", e)))?;

            tx.execute(
                &format!("CREATE TABLE {} ({})", quote_ident(table_name), column_defs),
                [],
            )
            .map_err(|e| {
                Nl2SqlError::Database(format!("Failed to create table {}: {}", table_name, e))
            })?;

            {
                let mut stmt = tx
                    .prepare(&insert_sql)
                    .map_err(|e| {
                        Nl2SqlError::Database(format!("Failed to prepare insert: {}", e))
                    })?;
                for row in &data.rows {
                    let values = row.iter().zip(&types).map(|(cell, ty)| ty.to_sql_value(cell));
                    stmt.execute(params_from_iter(values))
                        .map_err(|e| {
                            Nl2SqlError::Database(format!("Failed to insert row: {}", e))
                        })?;
                }
            }

            tx.commit().map_err(|e| {
                Nl2SqlError::Database(format!("Failed to commit transaction: {}", e))
            })?;
        }

        info!(
            "Created table {} with {} columns and {} rows",
            table_name,
            data.headers.len(),
            data.rows.len()
        );

        self.get_table_context(table_name)
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let db = self.conn()?;
        let count: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table_name],
                |row| row.get(0),
            )
            .map_err(|e| Nl2SqlError::Database(format!("Failed to look up table: {}", e)))?;
        Ok(count > 0)
    }

    pub fn get_table_context(&self, table_name: &str) -> Result<TableContext> {
        if !self.table_exists(table_name)? {
            return Err(Nl2SqlError::TableNotFound(table_name.to_string()));
        }

        let db = self.conn()?;
        let quoted = quote_ident(table_name);

        let mut stmt = db
            .prepare(&format!("PRAGMA table_info({})", quoted))
            .map_err(|e| Nl2SqlError::Database(format!("Failed to read schema: {}", e)))?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })
            .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
            .map_err(|e| Nl2SqlError::Database(format!("Failed to read schema: {}", e)))?;

        let row_count: i64 = db
            .query_row(&format!("SELECT COUNT(*) FROM {}", quoted), [], |row| row.get(0))
            .map_err(|e| Nl2SqlError::Database(format!("Failed to count rows: {}", e)))?;

        let mut stmt = db
            .prepare(&format!("SELECT * FROM {} LIMIT ?1", quoted))
            .map_err(|e| Nl2SqlError::Database(format!("Failed to read samples: {}", e)))?;
        let names = column_names(&stmt);
        let sample_rows = stmt
            .query_map(params![self.sample_limit as i64], |row| row_to_json(row, &names))
            .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
            .map_err(|e| Nl2SqlError::Database(format!("Failed to read samples: {}", e)))?;

        Ok(TableContext {
            table_name: table_name.to_string(),
            columns,
            sample_rows,
            row_count: row_count.max(0) as u64,
        })
    }

    /// User tables in creation order.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let db = self.conn()?;
        let mut stmt = db
            .prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            )
            .map_err(|e| Nl2SqlError::Database(format!("Failed to list tables: {}", e)))?;
        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
            .map_err(|e| Nl2SqlError::Database(format!("Failed to list tables: {}", e)))?;
        Ok(tables)
    }

    pub fn delete_table(&self, table_name: &str) -> Result<()> {
        if !self.table_exists(table_name)? {
            return Err(Nl2SqlError::TableNotFound(table_name.to_string()));
        }
        let db = self.conn()?;
        db.execute(&format!("DROP TABLE {}", quote_ident(table_name)), [])
            .map_err(|e| {
                Nl2SqlError::Database(format!("Failed to drop table {}: {}", table_name, e))
            })?;
        info!("Deleted table {}", table_name);
        Ok(())
    }

    /// Run a validated statement. SQLite itself is asked whether the prepared
    /// statement writes; anything that does is refused.
    pub fn execute(&self, query: &ValidatedQuery) -> Result<QueryResult> {
        let started = Instant::now();
        let db = self.conn()?;

        let mut stmt = db
            .prepare(query.as_str())
            .map_err(|e| Nl2SqlError::Database(format!("Failed to prepare query: {}", e)))?;
        if !stmt.readonly() {
            return Err(Nl2SqlError::Database(
                "Refusing to run a statement that modifies the database".to_string(),
            ));
        }

        let columns = column_names(&stmt);
        let rows = stmt
            .query_map([], |row| row_to_json(row, &columns))
            .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
            .map_err(|e| Nl2SqlError::Database(format!("Query failed: {}", e)))?;

        let elapsed = started.elapsed().as_millis() as u64;
        debug!("Query returned {} rows in {} ms", rows.len(), elapsed);
        Ok(QueryResult::new(columns, rows, elapsed))
    }
}

#[async_trait]
impl TableContextSource for SqliteStore {
    async fn fetch_table_context(&self, table_name: &str) -> Result<TableContext> {
        self.get_table_context(table_name)
    }
}

#[async_trait]
impl StatementRunner for SqliteStore {
    async fn run_statement(&self, query: ValidatedQuery) -> Result<QueryResult> {
        self.execute(&query)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_names(stmt: &rusqlite::Statement<'_>) -> Vec<String> {
    stmt.column_names().into_iter().map(|s| s.to_string()).collect()
}

fn row_to_json(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<SampleRow> {
    let mut object = SampleRow::new();
    for (i, name) in columns.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => Value::from(n),
            ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
            ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
        };
        object.insert(name.clone(), value);
    }
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sales_store() -> (SqliteStore, String) {
        let store = SqliteStore::open_in_memory().unwrap();
        let rows = vec![
            json!({"region": "West", "amount": 100.0}),
            json!({"region": "East", "amount": 50.0}),
            json!({"region": "West", "amount": 50.0}),
        ];
        let ctx = store.create_table_from_json(&rows, "sales.json").unwrap();
        (store, ctx.table_name)
    }

    fn validated(sql: &str, table: &str) -> ValidatedQuery {
        crate::sanitizer::SqlSanitizer::default()
            .validate(sql, table)
            .unwrap()
    }

    #[test]
    fn test_ingested_columns_are_typed() {
        let (store, table) = sales_store();
        let ctx = store.get_table_context(&table).unwrap();

        assert_eq!(ctx.row_count, 3);
        assert_eq!(ctx.sample_rows.len(), 3);
        assert_eq!(ctx.column("amount").unwrap().data_type, "REAL");
        assert_eq!(ctx.column("region").unwrap().data_type, "TEXT");
        assert_eq!(ctx.sample_rows[0]["region"], json!("West"));
    }

    #[test]
    fn test_sample_limit() {
        let (store, table) = sales_store();
        let store = store.with_sample_limit(2);
        let ctx = store.get_table_context(&table).unwrap();
        assert_eq!(ctx.sample_rows.len(), 2);
        assert_eq!(ctx.row_count, 3);
    }

    #[test]
    fn test_execute_select() {
        let (store, table) = sales_store();
        let sql = format!(
            "SELECT SUM(amount) AS total FROM {} WHERE UPPER(region) LIKE '%WEST%'",
            table
        );
        let result = store.execute(&validated(&sql, &table)).unwrap();

        assert_eq!(result.columns, vec!["total"]);
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0]["total"], json!(150.0));
    }

    #[test]
    fn test_unknown_table() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.get_table_context("missing"),
            Err(Nl2SqlError::TableNotFound(_))
        ));
        assert!(matches!(store.delete_table("missing"), Err(Nl2SqlError::TableNotFound(_))));
    }

    #[test]
    fn test_list_and_delete() {
        let (store, table) = sales_store();
        assert_eq!(store.list_tables().unwrap(), vec![table.clone()]);

        store.delete_table(&table).unwrap();
        assert!(store.list_tables().unwrap().is_empty());
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
