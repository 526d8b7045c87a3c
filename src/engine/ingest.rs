//! Rolling-window ingest
//!
//! Replaces every row of the target table inside the batch's date range with
//! the batch. The delete and the insert share one transaction, so a failing
//! insert leaves the previous window in place.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::DatabaseBackend;
use crate::database::sql::{date_literal, qualified_table, quote_ident, render_literal};
use crate::error::{EtlError, EtlResult};
use crate::models::{Batch, ColumnSpec, ColumnType, TableSpec};

/// Rows per INSERT statement
pub const INSERT_CHUNK_ROWS: usize = 500;

/// Rows the rolling delete is allowed to touch
///
/// The delete covers the whole date window of the table unless a scope
/// column narrows it. With a column scope every batch row must carry the
/// scope value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestScope {
    /// Every row of the table in the window
    Table,
    /// Only rows where `name = value`
    Column { name: String, value: Value },
}

impl IngestScope {
    pub fn column(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Column {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Result of [`ingest_rolling`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Loaded {
        rows_deleted: u64,
        rows_inserted: u64,
        min_date: NaiveDate,
        max_date: NaiveDate,
    },
    /// The batch was empty; nothing was deleted or inserted
    Skipped,
}

impl IngestOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, IngestOutcome::Skipped)
    }
}

/// Resolve the window column: the explicit one, else the table's ingest indicator
pub fn resolve_date_column<'a>(
    table: &'a TableSpec,
    date_column: Option<&str>,
) -> EtlResult<&'a ColumnSpec> {
    match date_column {
        Some(name) => table.column(name).ok_or_else(|| {
            EtlError::Configuration(format!(
                "Date column '{}' is not declared on table '{}'",
                name,
                table.qualified_name()
            ))
        }),
        None => table.ingest_column().ok_or_else(|| {
            EtlError::Configuration(format!(
                "Table '{}' has no ingest_indicator column and no date column was given",
                table.qualified_name()
            ))
        }),
    }
}

/// DELETE covering the days `[min_date, max_date]`, narrowed by `scope`
///
/// Timestamp columns are bounded by the start of the day after `max_date` so
/// the last day's rows after midnight fall inside the window.
pub fn rolling_delete_sql(
    table: &TableSpec,
    date_column: &str,
    min_date: NaiveDate,
    max_date: NaiveDate,
    scope: &IngestScope,
) -> EtlResult<String> {
    let column = table.column(date_column).ok_or_else(|| {
        EtlError::Configuration(format!(
            "Date column '{}' is not declared on table '{}'",
            date_column,
            table.qualified_name()
        ))
    })?;
    let window = match column.column_type {
        ColumnType::Timestamp | ColumnType::Timestamptz => {
            let after = max_date.succ_opt().ok_or_else(|| {
                EtlError::InvalidBatch(format!("Date {} has no following day", max_date))
            })?;
            format!(
                "{col} >= {} AND {col} < {}",
                date_literal(min_date),
                date_literal(after),
                col = quote_ident(date_column)
            )
        }
        _ => format!(
            "{} BETWEEN {} AND {}",
            quote_ident(date_column),
            date_literal(min_date),
            date_literal(max_date)
        ),
    };
    let mut sql = format!("DELETE FROM {} WHERE {}", qualified_table(table), window);

    if let IngestScope::Column { name, value } = scope {
        let column = table.column(name).ok_or_else(|| {
            EtlError::Configuration(format!(
                "Scope column '{}' is not declared on table '{}'",
                name,
                table.qualified_name()
            ))
        })?;
        sql.push_str(&format!(
            " AND {} = {}",
            quote_ident(name),
            render_literal(value, column)
        ));
    }

    Ok(sql)
}

/// Multi-row INSERT statements for `batch`, at most `chunk_rows` rows each
///
/// Every batch column must be declared on the table.
pub fn insert_statements(
    table: &TableSpec,
    batch: &Batch,
    chunk_rows: usize,
) -> EtlResult<Vec<String>> {
    let columns: Vec<&ColumnSpec> = batch
        .columns()
        .iter()
        .map(|name| {
            table.column(name).ok_or_else(|| {
                EtlError::InvalidBatch(format!(
                    "Batch column '{}' is not declared on table '{}'",
                    name,
                    table.qualified_name()
                ))
            })
        })
        .collect::<EtlResult<_>>()?;

    if batch.is_empty() || columns.is_empty() {
        return Ok(Vec::new());
    }

    let column_list: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
    let prefix = format!(
        "INSERT INTO {} ({}) VALUES ",
        qualified_table(table),
        column_list.join(", ")
    );

    Ok(batch
        .rows()
        .chunks(chunk_rows.max(1))
        .map(|chunk| {
            let values: Vec<String> = chunk
                .iter()
                .map(|row| {
                    let literals: Vec<String> = row
                        .iter()
                        .zip(&columns)
                        .map(|(value, column)| render_literal(value, column))
                        .collect();
                    format!("({})", literals.join(", "))
                })
                .collect();
            format!("{}{}", prefix, values.join(",\n"))
        })
        .collect())
}

/// Every row must carry the scope value, compared as the scope column's literal
fn check_scope(table: &TableSpec, batch: &Batch, scope: &IngestScope) -> EtlResult<()> {
    let IngestScope::Column { name, value } = scope else {
        return Ok(());
    };
    let column = table.column(name).ok_or_else(|| {
        EtlError::Configuration(format!(
            "Scope column '{}' is not declared on table '{}'",
            name,
            table.qualified_name()
        ))
    })?;
    let idx = batch.column_index(name).ok_or_else(|| {
        EtlError::InvalidBatch(format!("Scoped batch has no '{}' column", name))
    })?;

    let expected = render_literal(value, column);
    if let Some(row) = batch
        .rows()
        .iter()
        .position(|row| render_literal(&row[idx], column) != expected)
    {
        return Err(EtlError::InvalidBatch(format!(
            "Row {} has {} = {} outside the ingest scope {}",
            row, name, batch.rows()[row][idx], value
        )));
    }
    Ok(())
}

/// Replace the date window of `table` with `batch`
///
/// An empty batch is logged and skipped without touching the warehouse.
pub async fn ingest_rolling(
    backend: &dyn DatabaseBackend,
    batch: &Batch,
    table: &TableSpec,
    date_column: Option<&str>,
    scope: &IngestScope,
) -> EtlResult<IngestOutcome> {
    let date_column = resolve_date_column(table, date_column)?;

    if batch.is_empty() {
        tracing::warn!(
            table = %table.qualified_name(),
            "Batch is empty, skipping ingest"
        );
        return Ok(IngestOutcome::Skipped);
    }

    let Some((min_date, max_date)) = batch.date_range(&date_column.name)? else {
        return Ok(IngestOutcome::Skipped);
    };
    check_scope(table, batch, scope)?;

    let mut statements = vec![rolling_delete_sql(
        table,
        &date_column.name,
        min_date,
        max_date,
        scope,
    )?];
    statements.extend(insert_statements(table, batch, INSERT_CHUNK_ROWS)?);

    let counts = backend.execute_transaction(&statements).await?;
    let rows_deleted = counts.first().copied().unwrap_or(0);
    let rows_inserted: u64 = counts.iter().skip(1).sum();

    tracing::info!(
        table = %table.qualified_name(),
        %min_date,
        %max_date,
        rows_deleted,
        rows_inserted,
        "Rolling ingest complete"
    );

    Ok(IngestOutcome::Loaded {
        rows_deleted,
        rows_inserted,
        min_date,
        max_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TableType;
    use serde_json::json;

    fn table() -> TableSpec {
        TableSpec::new(
            "ga_sessions",
            TableType::Reporting,
            vec![
                ColumnSpec::new("report_date", ColumnType::Date).with_ingest_indicator(),
                ColumnSpec::varchar("data_source", 50),
                ColumnSpec::new("sessions", ColumnType::Bigint),
            ],
        )
        .with_schema("public")
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_resolve_date_column() {
        let table = table();
        assert_eq!(resolve_date_column(&table, None).unwrap().name, "report_date");
        assert!(resolve_date_column(&table, Some("day")).unwrap_err().is_configuration());

        let plain = TableSpec::new("t", TableType::Reporting, vec![]);
        assert!(resolve_date_column(&plain, None).is_err());
    }

    #[test]
    fn test_rolling_delete_sql() {
        let sql = rolling_delete_sql(&table(), "report_date", day(1), day(3), &IngestScope::Table)
            .unwrap();
        assert_eq!(
            sql,
            "DELETE FROM public.ga_sessions WHERE report_date BETWEEN DATE '2024-01-01' AND DATE '2024-01-03'"
        );

        let scoped = rolling_delete_sql(
            &table(),
            "report_date",
            day(1),
            day(3),
            &IngestScope::column("data_source", "ga"),
        )
        .unwrap();
        assert!(scoped.ends_with(" AND data_source = 'ga'"));
    }

    #[test]
    fn test_insert_statements_are_chunked() {
        let records: Vec<Value> = (1..=5)
            .map(|i| json!({"report_date": format!("2024-01-0{}", i), "sessions": i}))
            .collect();
        let batch = Batch::from_records(&records).unwrap();
        let statements = insert_statements(&table(), &batch, 2).unwrap();
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with(
            "INSERT INTO public.ga_sessions (report_date, sessions) VALUES ('2024-01-01', 1),"
        ));
    }

    #[test]
    fn test_insert_rejects_unknown_columns() {
        let batch = Batch::from_records(&[json!({"report_date": "2024-01-01", "bogus": 1})]).unwrap();
        assert!(matches!(
            insert_statements(&table(), &batch, 10),
            Err(EtlError::InvalidBatch(_))
        ));
    }

    #[test]
    fn test_scope_check() {
        let batch = Batch::from_records(&[
            json!({"report_date": "2024-01-01", "data_source": "ga"}),
            json!({"report_date": "2024-01-02", "data_source": "gmb"}),
        ])
        .unwrap();
        let table = table();
        assert!(check_scope(&table, &batch, &IngestScope::Table).is_ok());
        assert!(check_scope(&table, &batch, &IngestScope::column("data_source", "ga")).is_err());
        assert!(
            check_scope(&table, &batch, &IngestScope::column("account", "ga"))
                .unwrap_err()
                .is_configuration()
        );
    }

    #[test]
    fn test_scope_check_compares_as_column_literal() {
        let mut table = table();
        table
            .columns
            .push(ColumnSpec::new("account_id", ColumnType::Bigint));
        let batch = Batch::from_records(&[
            json!({"report_date": "2024-01-01", "account_id": 1}),
            json!({"report_date": "2024-01-02", "account_id": "1"}),
        ])
        .unwrap();

        assert!(check_scope(&table, &batch, &IngestScope::column("account_id", "1")).is_ok());
        assert!(check_scope(&table, &batch, &IngestScope::column("account_id", 1)).is_ok());
        assert!(matches!(
            check_scope(&table, &batch, &IngestScope::column("account_id", 2)),
            Err(EtlError::InvalidBatch(_))
        ));
    }

    #[test]
    fn test_rolling_delete_sql_timestamp_window() {
        let table = TableSpec::new(
            "events",
            TableType::Reporting,
            vec![ColumnSpec::new("loaded_at", ColumnType::Timestamp).with_ingest_indicator()],
        )
        .with_schema("public");
        let sql =
            rolling_delete_sql(&table, "loaded_at", day(1), day(3), &IngestScope::Table).unwrap();
        assert_eq!(
            sql,
            "DELETE FROM public.events WHERE loaded_at >= DATE '2024-01-01' AND loaded_at < DATE '2024-01-04'"
        );
    }
}
