//! Schema drift detection
//!
//! Tables are never altered after creation. When an existing table's columns
//! differ from its [`TableSpec`] the difference is reported so the table can
//! be recreated by hand.

use std::collections::HashSet;

use super::{DatabaseBackend, DatabaseResult};
use crate::models::TableSpec;

/// Differences between a declared table and the live one
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SchemaDrift {
    /// Declared columns missing from the live table
    pub missing_columns: Vec<String>,
    /// Live columns the table does not declare
    pub extra_columns: Vec<String>,
}

impl SchemaDrift {
    pub fn is_empty(&self) -> bool {
        self.missing_columns.is_empty() && self.extra_columns.is_empty()
    }
}

/// Compare declared column names with the live column names
pub fn compare_columns(table: &TableSpec, existing: &[String]) -> SchemaDrift {
    let existing_names: HashSet<&str> = existing.iter().map(String::as_str).collect();
    let declared_names: HashSet<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();

    SchemaDrift {
        missing_columns: table
            .columns
            .iter()
            .filter(|c| !existing_names.contains(c.name.as_str()))
            .map(|c| c.name.clone())
            .collect(),
        extra_columns: existing
            .iter()
            .filter(|n| !declared_names.contains(n.as_str()))
            .cloned()
            .collect(),
    }
}

/// Detect drift for an existing table
///
/// Returns `None` when the catalog reports no columns for the table.
pub async fn detect_schema_drift(
    backend: &dyn DatabaseBackend,
    table: &TableSpec,
) -> DatabaseResult<Option<SchemaDrift>> {
    let existing = backend.existing_columns(&table.schema, &table.name).await?;
    if existing.is_empty() {
        return Ok(None);
    }
    Ok(Some(compare_columns(table, &existing)))
}

/// Log drift as warnings; nothing is altered
pub fn report_drift(table: &TableSpec, drift: &SchemaDrift) {
    if drift.is_empty() {
        return;
    }
    tracing::warn!(
        table = %table.qualified_name(),
        missing = ?drift.missing_columns,
        extra = ?drift.extra_columns,
        "Live table differs from its declaration; recreate it to apply the change"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnSpec, ColumnType, TableType};

    #[test]
    fn test_compare_columns() {
        let table = TableSpec::new(
            "ga_sessions",
            TableType::Reporting,
            vec![
                ColumnSpec::new("report_date", ColumnType::Date),
                ColumnSpec::new("sessions", ColumnType::Bigint),
            ],
        );
        let existing = vec!["report_date".to_string(), "users".to_string()];
        let drift = compare_columns(&table, &existing);
        assert_eq!(drift.missing_columns, vec!["sessions".to_string()]);
        assert_eq!(drift.extra_columns, vec!["users".to_string()]);
        assert!(!drift.is_empty());

        let same = vec!["sessions".to_string(), "report_date".to_string()];
        assert!(compare_columns(&table, &same).is_empty());
    }
}
