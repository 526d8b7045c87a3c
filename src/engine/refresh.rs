//! Lookup/source refresh
//!
//! On configured days of the month every active lookup and source table is
//! replaced with the current snapshot of its worksheet. Each table is its own
//! transaction; a failure leaves earlier tables refreshed and later ones
//! stale, and the next run retries them.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ingest::{INSERT_CHUNK_ROWS, insert_statements};
use crate::database::DatabaseBackend;
use crate::database::config::RefreshSection;
use crate::database::sql::qualified_table;
use crate::error::EtlResult;
use crate::models::{Batch, TableSpec, coerce_value, normalize_column_name};
use crate::registry::SchemaRegistry;
use crate::sources::WorksheetSource;

/// Set to `1` in child processes whose parent already refreshed the dimensions
pub const REFRESHED_ENV: &str = "REPORTING_ETL_DIMENSIONS_REFRESHED";

static PROCESS_REFRESHED: AtomicBool = AtomicBool::new(false);

/// "Already refreshed in this run" flag
///
/// [`RefreshLatch::process`] is shared by everything in the process and also
/// honours [`REFRESHED_ENV`], so scripts launched by the queue runner skip the
/// refresh their parent performed. [`RefreshLatch::new`] is independent.
#[derive(Debug)]
pub struct RefreshLatch {
    isolated: Option<AtomicBool>,
}

impl RefreshLatch {
    /// The process-wide latch
    pub fn process() -> Self {
        Self { isolated: None }
    }

    /// A latch independent of the process-wide one
    pub fn new() -> Self {
        Self {
            isolated: Some(AtomicBool::new(false)),
        }
    }

    fn flag(&self) -> &AtomicBool {
        self.isolated.as_ref().unwrap_or(&PROCESS_REFRESHED)
    }

    pub fn is_set(&self) -> bool {
        if self.flag().load(Ordering::SeqCst) {
            return true;
        }
        self.isolated.is_none() && std::env::var(REFRESHED_ENV).is_ok_and(|v| v == "1")
    }

    pub fn set(&self) {
        self.flag().store(true, Ordering::SeqCst);
    }
}

impl Default for RefreshLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `today` is one of the configured refresh days of the month
pub fn is_refresh_due(today: NaiveDate, refresh_days: &[u32]) -> bool {
    refresh_days.contains(&today.day())
}

/// Refresh result for one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TableRefresh {
    Refreshed { table: String, rows: usize },
    /// The worksheet had no rows; the table was left as it was
    SkippedEmpty { table: String },
}

/// Result of a refresh pass
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RefreshReport {
    /// Whether today was a refresh day
    pub due: bool,
    pub tables: Vec<TableRefresh>,
}

impl RefreshReport {
    /// Number of tables actually refreshed
    pub fn count(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| matches!(t, TableRefresh::Refreshed { .. }))
            .count()
    }
}

/// Shape a worksheet snapshot into `table`'s columns
///
/// Headers are normalised and `drop_columns` removed. The result has exactly
/// the table's columns in declared order: worksheet columns the table does
/// not declare are ignored, declared columns missing from the sheet are NULL,
/// and every value is coerced to its column type. Blank rows are dropped.
pub fn prepare_worksheet(
    mut sheet: Batch,
    table: &TableSpec,
    drop_columns: &[String],
) -> EtlResult<Batch> {
    sheet.map_column_names(normalize_column_name);
    let dropped: Vec<String> = drop_columns.iter().map(|c| normalize_column_name(c)).collect();
    sheet.drop_columns(&dropped);

    let ignored: Vec<&String> = sheet
        .columns()
        .iter()
        .filter(|c| !table.has_column(c))
        .collect();
    if !ignored.is_empty() {
        tracing::debug!(table = %table.qualified_name(), ?ignored, "Ignoring undeclared worksheet columns");
    }

    let indices: Vec<Option<usize>> = table
        .columns
        .iter()
        .map(|c| sheet.column_index(&c.name))
        .collect();

    let mut prepared = Batch::new(table.columns.iter().map(|c| c.name.clone()).collect());
    for row in sheet.rows() {
        let values: Vec<Value> = table
            .columns
            .iter()
            .zip(&indices)
            .map(|(column, idx)| match idx {
                Some(i) => coerce_value(&row[*i], column),
                None => Value::Null,
            })
            .collect();
        if values.iter().all(Value::is_null) {
            continue;
        }
        prepared.push_row(values)?;
    }

    Ok(prepared)
}

/// Lookup/source refresh engine
pub struct RefreshEngine<'a> {
    backend: &'a dyn DatabaseBackend,
    source: &'a dyn WorksheetSource,
    settings: &'a RefreshSection,
    latch: &'a RefreshLatch,
}

impl<'a> RefreshEngine<'a> {
    pub fn new(
        backend: &'a dyn DatabaseBackend,
        source: &'a dyn WorksheetSource,
        settings: &'a RefreshSection,
        latch: &'a RefreshLatch,
    ) -> Self {
        Self {
            backend,
            source,
            settings,
            latch,
        }
    }

    /// Refresh every dimension table when `today` is a refresh day
    ///
    /// Not due, or already refreshed in this run: nothing is fetched or written.
    pub async fn refresh_if_due(
        &self,
        registry: &SchemaRegistry,
        today: NaiveDate,
    ) -> EtlResult<RefreshReport> {
        if !is_refresh_due(today, &self.settings.source_refresh_dates) {
            tracing::info!(
                day = today.day(),
                refresh_days = ?self.settings.source_refresh_dates,
                "Dimension refresh not due"
            );
            return Ok(RefreshReport::default());
        }

        if self.latch.is_set() {
            tracing::info!("Dimensions already refreshed in this run");
            return Ok(RefreshReport {
                due: true,
                tables: Vec::new(),
            });
        }

        let mut report = self.force(registry).await?;
        report.due = true;
        Ok(report)
    }

    /// Refresh every active lookup and source table regardless of the date
    pub async fn force(&self, registry: &SchemaRegistry) -> EtlResult<RefreshReport> {
        let mut report = RefreshReport::default();
        for table in registry.dimension_tables() {
            report.tables.push(self.refresh_table(table).await?);
        }
        self.latch.set();

        tracing::info!(
            refreshed = report.count(),
            tables = report.tables.len(),
            "Dimension refresh complete"
        );
        Ok(report)
    }

    /// Replace one table with its worksheet snapshot
    pub async fn refresh_table(&self, table: &TableSpec) -> EtlResult<TableRefresh> {
        let sheet = self
            .source
            .get_worksheet(&self.settings.workbook, table.worksheet_name())
            .await?;
        let prepared = prepare_worksheet(sheet, table, &self.settings.drop_columns)?;

        if prepared.is_empty() {
            tracing::warn!(
                table = %table.qualified_name(),
                worksheet = table.worksheet_name(),
                "Worksheet is empty, keeping existing rows"
            );
            return Ok(TableRefresh::SkippedEmpty {
                table: table.qualified_name(),
            });
        }

        let mut statements = vec![format!("DELETE FROM {}", qualified_table(table))];
        statements.extend(insert_statements(table, &prepared, INSERT_CHUNK_ROWS)?);
        self.backend.execute_transaction(&statements).await?;

        tracing::info!(
            table = %table.qualified_name(),
            rows = prepared.len(),
            "Refreshed table"
        );

        Ok(TableRefresh::Refreshed {
            table: table.qualified_name(),
            rows: prepared.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnSpec, ColumnType, TableType};
    use serde_json::json;

    fn lookup() -> TableSpec {
        TableSpec::new(
            "lookup_urltolocation",
            TableType::Lookup,
            vec![
                ColumnSpec::varchar("url", 8).with_backfilter(),
                ColumnSpec::varchar("property", 100).with_entity(),
                ColumnSpec::new("exact", ColumnType::Bigint).with_flag(),
            ],
        )
    }

    #[test]
    fn test_refresh_due() {
        let days = [1, 15];
        assert!(is_refresh_due(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(), &days));
        assert!(!is_refresh_due(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(), &days));
        assert!(!is_refresh_due(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), &[]));
    }

    #[test]
    fn test_prepare_worksheet() {
        let sheet = Batch::from_records(&[
            json!({"URL": "/contact-us", "Property": "SiteA", "Exact": 1, "Notes": "x"}),
            json!({"URL": "contact", "Property": "SiteB", "Exact": "no"}),
            json!({"URL": "", "Property": "", "Exact": ""}),
        ])
        .unwrap();

        let prepared = prepare_worksheet(sheet, &lookup(), &["Notes".to_string()]).unwrap();
        assert_eq!(prepared.columns(), &["url", "property", "exact"]);
        assert_eq!(prepared.len(), 2);
        assert_eq!(prepared.get(0, "url"), Some(&json!("/contact")));
        assert_eq!(prepared.get(0, "exact"), Some(&json!(1)));
        assert_eq!(prepared.get(1, "exact"), Some(&Value::Null));
    }

    #[test]
    fn test_prepare_worksheet_fills_missing_columns() {
        let sheet = Batch::from_records(&[json!({"url": "/a"})]).unwrap();
        let prepared = prepare_worksheet(sheet, &lookup(), &[]).unwrap();
        assert_eq!(prepared.get(0, "property"), Some(&Value::Null));
    }

    #[test]
    fn test_isolated_latch() {
        let latch = RefreshLatch::new();
        assert!(!latch.is_set());
        latch.set();
        assert!(latch.is_set());
        assert!(!RefreshLatch::new().is_set());
    }

    #[test]
    fn test_report_count() {
        let report = RefreshReport {
            due: true,
            tables: vec![
                TableRefresh::Refreshed {
                    table: "a".to_string(),
                    rows: 2,
                },
                TableRefresh::SkippedEmpty {
                    table: "b".to_string(),
                },
            ],
        };
        assert_eq!(report.count(), 1);
    }
}
