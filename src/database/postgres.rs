//! PostgreSQL database backend implementation
//!
//! The production warehouse. Uses connection pooling via deadpool-postgres;
//! a client is checked out of the pool for each logical operation and
//! returned when the operation completes.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use serde_json::Value;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, Type};

use super::config::WarehouseSection;
use super::{DatabaseBackend, DatabaseError, DatabaseResult, Dialect, QueryResult};

/// PostgreSQL database backend
pub struct PostgresBackend {
    /// Connection string with the password masked
    masked_connection: String,
    /// Connection pool
    pool: Pool,
}

impl PostgresBackend {
    /// Create a new PostgreSQL backend
    ///
    /// Builds the pool and checks out one client to verify the connection.
    pub async fn new(warehouse: &WarehouseSection) -> DatabaseResult<Self> {
        let mut config = Config::new();
        config.host = Some(warehouse.server.clone());
        config.port = Some(warehouse.port);
        config.dbname = Some(warehouse.database.clone());
        config.user = Some(warehouse.username.clone());
        if !warehouse.password.is_empty() {
            config.password = Some(warehouse.password.clone());
        }
        config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        config.pool = Some(PoolConfig::new(warehouse.pool_size.max(1)));

        let pool = config
            .create_pool(Some(Runtime::Tokio1), tokio_postgres::NoTls)
            .map_err(|e| {
                DatabaseError::ConnectionFailed(format!("Failed to create PostgreSQL pool: {}", e))
            })?;

        let backend = Self {
            masked_connection: warehouse.masked_connection_string(),
            pool,
        };

        backend.client().await?;
        tracing::info!(connection = %backend.masked_connection, "Connected to PostgreSQL warehouse");

        Ok(backend)
    }

    /// Get the connection string (masked for security)
    pub fn connection_string_masked(&self) -> &str {
        &self.masked_connection
    }

    async fn client(&self) -> DatabaseResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            DatabaseError::ConnectionFailed(format!(
                "Failed to connect to PostgreSQL ({}): {}",
                self.masked_connection, e
            ))
        })
    }

    fn row_to_json(row: &Row) -> Value {
        let map = row
            .columns()
            .iter()
            .enumerate()
            .map(|(i, column)| (column.name().to_string(), cell_to_json(row, i, column.type_())))
            .collect();
        Value::Object(map)
    }
}

fn cell<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, to_json: impl FnOnce(T) -> Value) -> Value {
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => to_json(v),
        _ => Value::Null,
    }
}

fn float(f: f64) -> Value {
    serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
}

/// Warehouse cell as JSON; dates and timestamps become ISO text
fn cell_to_json(row: &Row, idx: usize, ty: &Type) -> Value {
    match *ty {
        Type::BOOL => cell(row, idx, Value::Bool),
        Type::INT2 => cell(row, idx, |n: i16| Value::from(n)),
        Type::INT4 => cell(row, idx, |n: i32| Value::from(n)),
        Type::INT8 => cell(row, idx, |n: i64| Value::from(n)),
        Type::FLOAT4 => cell(row, idx, |f: f32| float(f64::from(f))),
        Type::FLOAT8 => cell(row, idx, float),
        Type::DATE => cell(row, idx, |d: NaiveDate| {
            Value::String(d.format("%Y-%m-%d").to_string())
        }),
        Type::TIMESTAMP => cell(row, idx, |ts: NaiveDateTime| {
            Value::String(ts.format("%Y-%m-%d %H:%M:%S").to_string())
        }),
        Type::TIMESTAMPTZ => cell(row, idx, |ts: DateTime<Utc>| Value::String(ts.to_rfc3339())),
        // varchar, text, name and anything else readable as text
        _ => cell(row, idx, Value::String),
    }
}

#[async_trait(?Send)]
impl DatabaseBackend for PostgresBackend {
    async fn execute_query(&self, sql: &str) -> DatabaseResult<QueryResult> {
        let start = std::time::Instant::now();
        let client = self.client().await?;

        let stmt = client
            .prepare(sql)
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;

        let columns: Vec<String> = stmt
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let rows = client
            .query(&stmt, &[])
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?;

        let json_rows = rows.iter().map(Self::row_to_json).collect();

        Ok(QueryResult {
            columns,
            rows: json_rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn execute(&self, sql: &str) -> DatabaseResult<u64> {
        let client = self.client().await?;

        client
            .execute(sql, &[])
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Execute failed: {}", e)))
    }

    async fn execute_transaction(&self, statements: &[String]) -> DatabaseResult<Vec<u64>> {
        let mut client = self.client().await?;

        let tx = client.transaction().await.map_err(|e| {
            DatabaseError::TransactionFailed(format!("Failed to begin transaction: {}", e))
        })?;

        let mut counts = Vec::with_capacity(statements.len());
        for sql in statements {
            // Dropping `tx` on error rolls the transaction back
            let affected = tx.execute(sql.as_str(), &[]).await.map_err(|e| {
                DatabaseError::TransactionFailed(format!("Statement failed, rolled back: {}", e))
            })?;
            counts.push(affected);
        }

        tx.commit().await.map_err(|e| {
            DatabaseError::TransactionFailed(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(counts)
    }

    async fn execute_script_transaction(&self, script: &str) -> DatabaseResult<()> {
        let mut client = self.client().await?;

        let tx = client.transaction().await.map_err(|e| {
            DatabaseError::TransactionFailed(format!("Failed to begin transaction: {}", e))
        })?;

        tx.batch_execute(script).await.map_err(|e| {
            DatabaseError::TransactionFailed(format!("Script failed, rolled back: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            DatabaseError::TransactionFailed(format!("Failed to commit transaction: {}", e))
        })
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn close(&self) -> DatabaseResult<()> {
        self.pool.close();
        Ok(())
    }
}
