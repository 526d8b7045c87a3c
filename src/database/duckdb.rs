//! DuckDB database backend implementation
//!
//! Provides an embedded warehouse for local runs and the test-suite. DuckDB
//! has no CLUSTER, index options or table owners; the DDL layer skips them for
//! [`Dialect::DuckDB`].

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use duckdb::types::ValueRef;
use serde_json::Value;

use super::{DatabaseBackend, DatabaseError, DatabaseResult, Dialect, QueryResult};

/// DuckDB database backend
///
/// Supports both file-based persistence and in-memory mode.
pub struct DuckDBBackend {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// DuckDB connection (wrapped in Mutex for thread safety)
    connection: Mutex<duckdb::Connection>,
}

impl DuckDBBackend {
    /// Create a new DuckDB backend with a file-based database
    pub fn new(db_path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path).map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to open DuckDB: {}", e))
        })?;

        tracing::debug!(path = %path.display(), "Opened DuckDB warehouse");

        Ok(Self {
            db_path: Some(path),
            connection: Mutex::new(connection),
        })
    }

    /// Create an in-memory DuckDB backend
    pub fn in_memory() -> DatabaseResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to create in-memory DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: None,
            connection: Mutex::new(connection),
        })
    }

    /// Get the database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Check if this is an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    fn lock(&self) -> DatabaseResult<MutexGuard<'_, duckdb::Connection>> {
        self.connection
            .lock()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Lock error: {}", e)))
    }

    fn row_to_json(row: &duckdb::Row, columns: &[String]) -> Value {
        let map = columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = row.get_ref(i).map(cell_to_json).unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect();
        Value::Object(map)
    }
}

fn number(n: impl Into<serde_json::Number>) -> Value {
    Value::Number(n.into())
}

fn float(f: f64) -> Value {
    serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
}

/// Warehouse cell as JSON; dates and timestamps become ISO text
fn cell_to_json(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => number(i),
        ValueRef::SmallInt(i) => number(i),
        ValueRef::Int(i) => number(i),
        ValueRef::BigInt(i) => number(i),
        ValueRef::UTinyInt(i) => number(i),
        ValueRef::USmallInt(i) => number(i),
        ValueRef::UInt(i) => number(i),
        ValueRef::UBigInt(i) => number(i),
        // i128 may not fit in a JSON number
        ValueRef::HugeInt(i) => Value::String(i.to_string()),
        ValueRef::Float(f) => float(f64::from(f)),
        ValueRef::Double(f) => float(f),
        ValueRef::Decimal(d) => Value::String(d.to_string()),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(BASE64.encode(bytes)),
        ValueRef::Date32(days) => {
            chrono::NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
                .map_or(Value::Null, |d| Value::String(d.format("%Y-%m-%d").to_string()))
        }
        ValueRef::Timestamp(unit, raw) => chrono::DateTime::from_timestamp_micros(unit.to_micros(raw))
            .map_or(Value::Null, |ts| {
                Value::String(ts.format("%Y-%m-%d %H:%M:%S").to_string())
            }),
        other => Value::String(format!("{:?}", other)),
    }
}

/// Days from 0001-01-01 to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[async_trait(?Send)]
impl DatabaseBackend for DuckDBBackend {
    async fn execute_query(&self, sql: &str) -> DatabaseResult<QueryResult> {
        let start = std::time::Instant::now();

        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;

        // In DuckDB 1.4+, we need to execute the query first, then get columns
        let mut result_rows = stmt
            .query([])
            .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?;

        let column_count = result_rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
        let columns: Vec<String> = (0..column_count)
            .map(|i| {
                result_rows
                    .as_ref()
                    .and_then(|r| r.column_name(i).ok())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("col{}", i))
            })
            .collect();

        let mut rows = Vec::new();
        while let Some(row) = result_rows
            .next()
            .map_err(|e| DatabaseError::QueryFailed(format!("Row fetch error: {}", e)))?
        {
            rows.push(Self::row_to_json(row, &columns));
        }

        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn execute(&self, sql: &str) -> DatabaseResult<u64> {
        let conn = self.lock()?;

        conn.execute(sql, [])
            .map(|n| n as u64)
            .map_err(|e| DatabaseError::QueryFailed(format!("Execute failed: {}", e)))
    }

    async fn execute_transaction(&self, statements: &[String]) -> DatabaseResult<Vec<u64>> {
        let mut conn = self.lock()?;

        let tx = conn.transaction().map_err(|e| {
            DatabaseError::TransactionFailed(format!("Failed to begin transaction: {}", e))
        })?;

        let mut counts = Vec::with_capacity(statements.len());
        for sql in statements {
            // Dropping `tx` on error rolls the transaction back
            let affected = tx.execute(sql, []).map_err(|e| {
                DatabaseError::TransactionFailed(format!("Statement failed, rolled back: {}", e))
            })?;
            counts.push(affected as u64);
        }

        tx.commit().map_err(|e| {
            DatabaseError::TransactionFailed(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(counts)
    }

    async fn execute_script_transaction(&self, script: &str) -> DatabaseResult<()> {
        let mut conn = self.lock()?;

        let tx = conn.transaction().map_err(|e| {
            DatabaseError::TransactionFailed(format!("Failed to begin transaction: {}", e))
        })?;

        tx.execute_batch(script).map_err(|e| {
            DatabaseError::TransactionFailed(format!("Script failed, rolled back: {}", e))
        })?;

        tx.commit().map_err(|e| {
            DatabaseError::TransactionFailed(format!("Failed to commit transaction: {}", e))
        })
    }

    fn dialect(&self) -> Dialect {
        Dialect::DuckDB
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_backend() {
        let backend = DuckDBBackend::in_memory().unwrap();
        assert!(backend.is_in_memory());
        assert!(backend.db_path().is_none());
        assert_eq!(backend.backend_type(), "duckdb");
    }

    #[tokio::test]
    async fn test_health_check() {
        let backend = DuckDBBackend::in_memory().unwrap();
        assert!(backend.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_execute_query() {
        let backend = DuckDBBackend::in_memory().unwrap();
        let result = backend
            .execute_query("SELECT 1 as num, 'hello' as greeting, DATE '2024-02-29' as day")
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["num", "greeting", "day"]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0]["num"], 1);
        assert_eq!(result.rows[0]["greeting"], "hello");
        assert_eq!(result.rows[0]["day"], "2024-02-29");
    }

    #[tokio::test]
    async fn test_transaction_rolls_back() {
        let backend = DuckDBBackend::in_memory().unwrap();
        backend
            .execute("CREATE TABLE t (id BIGINT NOT NULL)")
            .await
            .unwrap();

        let result = backend
            .execute_transaction(&[
                "INSERT INTO t VALUES (1)".to_string(),
                "INSERT INTO t VALUES (NULL)".to_string(),
            ])
            .await;
        assert!(matches!(result, Err(DatabaseError::TransactionFailed(_))));

        let count = backend
            .execute_query("SELECT COUNT(*) AS n FROM t")
            .await
            .unwrap();
        assert_eq!(count.scalar_i64("n"), Some(0));

        let counts = backend
            .execute_transaction(&[
                "INSERT INTO t VALUES (1), (2)".to_string(),
                "DELETE FROM t WHERE id = 1".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(counts, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_catalog_helpers() {
        let backend = DuckDBBackend::in_memory().unwrap();
        backend
            .execute("CREATE TABLE main.ga_sessions (report_date DATE, sessions BIGINT)")
            .await
            .unwrap();

        assert!(backend.table_exists("main", "ga_sessions").await.unwrap());
        assert!(!backend.table_exists("main", "missing").await.unwrap());
        assert_eq!(
            backend.existing_columns("main", "ga_sessions").await.unwrap(),
            vec!["report_date".to_string(), "sessions".to_string()]
        );
    }
}
