//! Warehouse backend abstraction
//!
//! This module provides the warehouse layer the engines run against:
//! - PostgreSQL: the production warehouse (pooled via deadpool-postgres)
//! - DuckDB: embedded warehouse for local runs and the test-suite
//!
//! Engines only talk to the [`DatabaseBackend`] trait. SQL text is produced by
//! [`ddl`] and [`sql`] with the backend's [`Dialect`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

#[cfg(feature = "postgres-backend")]
pub mod postgres;

pub mod config;
pub mod ddl;
pub mod drift;
pub mod sql;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDBBackend;

#[cfg(feature = "postgres-backend")]
pub use self::postgres::PostgresBackend;

pub use config::{Dbms, EtlConfig, WarehouseSection};
pub use sql::{quote_ident, quote_literal};

/// Error type for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed and was rolled back
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Table or index creation failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// SQL dialect spoken by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    DuckDB,
}

impl Dialect {
    /// Whether `CLUSTER table USING index` is available
    pub fn supports_cluster(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Whether index access methods, sort options and tablespaces are accepted
    pub fn supports_index_options(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Whether table ownership can be assigned
    pub fn supports_owner(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Type name for the double-precision column type
    pub fn double_type(&self) -> &'static str {
        match self {
            Dialect::Postgres => "DOUBLE PRECISION",
            Dialect::DuckDB => "DOUBLE",
        }
    }
}

/// Query result row as a JSON object
pub type QueryRow = serde_json::Value;

/// Query result set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Rows of data
    pub rows: Vec<QueryRow>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a new query result
    pub fn new(columns: Vec<String>, rows: Vec<QueryRow>) -> Self {
        Self {
            columns,
            rows,
            execution_time_ms: 0,
        }
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First value of a column in the first row as i64
    pub fn scalar_i64(&self, column: &str) -> Option<i64> {
        let value = self.rows.first()?.get(column)?;
        value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
    }
}

/// Warehouse backend trait
///
/// All operations are async so both backends share one interface; neither
/// backend runs work concurrently. Each call is one logical operation.
#[async_trait(?Send)]
pub trait DatabaseBackend {
    /// Execute a SQL query and return its rows
    async fn execute_query(&self, sql: &str) -> DatabaseResult<QueryResult>;

    /// Execute a single statement and return the affected row count
    async fn execute(&self, sql: &str) -> DatabaseResult<u64>;

    /// Execute statements in one transaction
    ///
    /// Either every statement commits or none does. Returns the affected row
    /// count of each statement in order.
    async fn execute_transaction(&self, statements: &[String]) -> DatabaseResult<Vec<u64>>;

    /// Execute a multi-statement script in one transaction
    async fn execute_script_transaction(&self, script: &str) -> DatabaseResult<()>;

    /// SQL dialect of this backend
    fn dialect(&self) -> Dialect;

    /// Get the database backend type name ("duckdb" or "postgres")
    fn backend_type(&self) -> &'static str;

    /// Check whether `(schema, name)` exists in the catalog
    async fn table_exists(&self, schema: &str, name: &str) -> DatabaseResult<bool> {
        let result = self.execute_query(&table_exists_sql(schema, name)).await?;
        Ok(result.scalar_i64("table_count").unwrap_or(0) > 0)
    }

    /// Column names of an existing table in ordinal order
    async fn existing_columns(&self, schema: &str, name: &str) -> DatabaseResult<Vec<String>> {
        let result = self
            .execute_query(&existing_columns_sql(schema, name))
            .await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|r| r.get("column_name").and_then(|v| v.as_str()))
            .map(|s| s.to_string())
            .collect())
    }

    /// Check if database is healthy and accessible
    async fn health_check(&self) -> DatabaseResult<bool> {
        let result = self.execute_query("SELECT 1 AS healthy").await?;
        Ok(!result.rows.is_empty())
    }

    /// Close the database connection
    async fn close(&self) -> DatabaseResult<()> {
        Ok(())
    }
}

/// Connect to the warehouse described by the configuration
pub async fn connect(config: &WarehouseSection) -> DatabaseResult<Box<dyn DatabaseBackend>> {
    match config.dbms()? {
        Dbms::Postgres => {
            #[cfg(feature = "postgres-backend")]
            {
                let backend = PostgresBackend::new(config).await?;
                Ok(Box::new(backend))
            }
            #[cfg(not(feature = "postgres-backend"))]
            {
                Err(DatabaseError::ConfigError(
                    "PostgreSQL backend not enabled. Build with --features postgres-backend"
                        .to_string(),
                ))
            }
        }
        Dbms::DuckDB => {
            #[cfg(feature = "duckdb-backend")]
            {
                let backend = match config.path.as_deref() {
                    Some(path) if !path.is_empty() && path != ":memory:" => {
                        DuckDBBackend::new(path)?
                    }
                    _ => DuckDBBackend::in_memory()?,
                };
                Ok(Box::new(backend))
            }
            #[cfg(not(feature = "duckdb-backend"))]
            {
                Err(DatabaseError::ConfigError(
                    "DuckDB backend not enabled. Build with --features duckdb-backend".to_string(),
                ))
            }
        }
    }
}

/// Catalog lookup for one table
///
/// Postgres reports catalog names as `sql_identifier`; they are cast to text
/// so every backend returns plain strings.
pub(crate) fn table_exists_sql(schema: &str, name: &str) -> String {
    format!(
        "SELECT COUNT(*) AS table_count FROM information_schema.tables \
         WHERE table_schema::text = {} AND table_name::text = {}",
        quote_literal(schema),
        quote_literal(name)
    )
}

/// Catalog column listing for one table, names cast to text
pub(crate) fn existing_columns_sql(schema: &str, name: &str) -> String {
    format!(
        "SELECT column_name::text AS column_name FROM information_schema.columns \
         WHERE table_schema::text = {} AND table_name::text = {} ORDER BY ordinal_position",
        quote_literal(schema),
        quote_literal(name)
    )
}
