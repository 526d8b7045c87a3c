//! Built-in stage hooks configured from a data source section

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{Parser, PostProcessor, Renamer, Typer};
use crate::database::DatabaseBackend;
use crate::engine::post_process::run_post_processing_scripts;
use crate::error::EtlResult;
use crate::models::{Batch, TableSpec, coerce_value, normalize_column_name, parse_date};

/// Normalises headers, then applies an explicit rename map
///
/// Map keys are matched after normalisation, so `"Page URL"` and `page_url`
/// name the same source column.
#[derive(Debug, Clone, Default)]
pub struct ColumnRenamer {
    renames: BTreeMap<String, String>,
}

impl ColumnRenamer {
    pub fn new(renames: &BTreeMap<String, String>) -> Self {
        Self {
            renames: renames
                .iter()
                .map(|(from, to)| (normalize_column_name(from), to.clone()))
                .collect(),
        }
    }
}

impl Renamer for ColumnRenamer {
    fn rename(&self, mut batch: Batch) -> EtlResult<Batch> {
        batch.map_column_names(|name| {
            let normalized = normalize_column_name(name);
            self.renames.get(&normalized).cloned().unwrap_or(normalized)
        });
        Ok(batch)
    }
}

/// Coerces every declared column onto its declared type
#[derive(Debug, Clone)]
pub struct SpecTyper {
    table: Arc<TableSpec>,
}

impl SpecTyper {
    pub fn new(table: Arc<TableSpec>) -> Self {
        Self { table }
    }
}

impl Typer for SpecTyper {
    fn apply_types(&self, mut batch: Batch) -> EtlResult<Batch> {
        for column in &self.table.columns {
            batch.map_column(&column.name, |value| coerce_value(value, column));
        }
        Ok(batch)
    }
}

/// Generic source parsing
///
/// Stamps the data source label into the scope column, normalises the date
/// column, drops rows without a date and columns the table does not declare.
#[derive(Debug, Clone)]
pub struct SourceParser {
    table: Arc<TableSpec>,
    date_column: Option<String>,
    stamp: Option<(String, String)>,
}

impl SourceParser {
    pub fn new(table: Arc<TableSpec>) -> Self {
        Self {
            table,
            date_column: None,
            stamp: None,
        }
    }

    pub fn with_date_column(mut self, column: impl Into<String>) -> Self {
        self.date_column = Some(column.into());
        self
    }

    /// Set `column` to `label` on every row
    pub fn with_stamp(mut self, column: impl Into<String>, label: impl Into<String>) -> Self {
        self.stamp = Some((column.into(), label.into()));
        self
    }
}

impl Parser for SourceParser {
    fn parse(&self, mut batch: Batch) -> EtlResult<Batch> {
        if let Some((column, label)) = &self.stamp {
            batch.set_column(column, Value::String(label.clone()));
        }

        let date_column = self
            .date_column
            .clone()
            .or_else(|| self.table.ingest_column().map(|c| c.name.clone()));

        if let Some(date_column) = date_column
            && let Some(idx) = batch.column_index(&date_column)
        {
            batch.map_column(&date_column, |value| {
                parse_date(value)
                    .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                    .unwrap_or(Value::Null)
            });
            let before = batch.len();
            batch.retain_rows(|row| !row[idx].is_null());
            let dropped = before - batch.len();
            if dropped > 0 {
                tracing::warn!(
                    table = %self.table.qualified_name(),
                    column = %date_column,
                    dropped,
                    "Dropped rows without a parseable date"
                );
            }
        }

        let table = &self.table;
        batch.retain_columns_where(|name| table.has_column(name));
        Ok(batch)
    }
}

/// Runs the ordered `.sql` scripts matching a script name
#[derive(Debug, Clone)]
pub struct SqlScriptPostProcessor {
    dir: PathBuf,
    script_name: String,
}

impl SqlScriptPostProcessor {
    pub fn new(dir: impl Into<PathBuf>, script_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            script_name: script_name.into(),
        }
    }
}

#[async_trait(?Send)]
impl PostProcessor for SqlScriptPostProcessor {
    async fn post_process(&self, backend: &dyn DatabaseBackend) -> EtlResult<()> {
        let scripts = run_post_processing_scripts(backend, &self.dir, &self.script_name).await?;
        tracing::info!(
            script_name = %self.script_name,
            scripts = scripts.len(),
            "Post-processing complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnSpec, ColumnType, TableType};
    use serde_json::json;

    fn table() -> Arc<TableSpec> {
        Arc::new(TableSpec::new(
            "moz_pro_rankings",
            TableType::Source,
            vec![
                ColumnSpec::new("report_date", ColumnType::Date).with_ingest_indicator(),
                ColumnSpec::varchar("url", 500),
                ColumnSpec::new("position", ColumnType::Bigint),
                ColumnSpec::varchar("data_source", 50),
            ],
        ))
    }

    #[test]
    fn test_renamer_normalises_then_maps() {
        let mut renames = BTreeMap::new();
        renames.insert("Page URL".to_string(), "url".to_string());
        let batch = Batch::from_records(&[json!({"Page URL": "/a", "Report Date": "2024-01-01"})])
            .unwrap();
        let out = ColumnRenamer::new(&renames).rename(batch).unwrap();
        assert_eq!(out.columns(), &["url", "report_date"]);
    }

    #[test]
    fn test_typer_coerces_declared_columns() {
        let batch = Batch::from_records(&[json!({"position": "3", "extra": "x"})]).unwrap();
        let out = SpecTyper::new(table()).apply_types(batch).unwrap();
        assert_eq!(out.get(0, "position"), Some(&json!(3)));
        assert_eq!(out.get(0, "extra"), Some(&json!("x")));
    }

    #[test]
    fn test_parser_stamps_and_filters() {
        let batch = Batch::from_records(&[
            json!({"report_date": "01/02/2024", "url": "/a", "keyword": "k"}),
            json!({"report_date": "", "url": "/b", "keyword": "k"}),
        ])
        .unwrap();

        let out = SourceParser::new(table())
            .with_stamp("data_source", "moz_pro")
            .parse(batch)
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out.columns(), &["report_date", "url", "data_source"]);
        assert_eq!(out.get(0, "report_date"), Some(&json!("2024-01-02")));
        assert_eq!(out.get(0, "data_source"), Some(&json!("moz_pro")));
    }
}
