//! Table specification validation
//!
//! Checks a set of [`TableSpec`]s for the structural rules provisioning
//! depends on: varchar lengths, exactly one clustering index on reporting and
//! master tables, index columns that exist, and unique names.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{EtlError, EtlResult};
use crate::models::{ColumnType, TableSpec};

/// Kind of rule a table specification breaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A varchar column has no `length`
    MissingLength,
    /// A reporting or master table does not have exactly one clustering index
    ClusteringIndex,
    /// An index names a column the table does not declare
    UnknownIndexColumn,
    /// A column name appears twice in one table
    DuplicateColumn,
    /// Two tables share the same `(schema, name)`
    DuplicateTable,
    /// A lookup table with update types does not declare its exact/fuzzy flag column
    MissingExactColumn,
}

/// One broken rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecViolation {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub kind: ViolationKind,
    pub message: String,
}

/// Result of table validation.
#[derive(Debug, Default, Serialize, Deserialize)]
#[must_use = "validation results should be checked for violations"]
pub struct TableValidationResult {
    pub violations: Vec<SpecViolation>,
}

impl TableValidationResult {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Convert to a configuration error listing every violation
    pub fn into_result(self) -> EtlResult<()> {
        if self.is_valid() {
            return Ok(());
        }
        let messages: Vec<String> = self.violations.into_iter().map(|v| v.message).collect();
        Err(EtlError::Configuration(messages.join("; ")))
    }
}

/// Table validator
#[derive(Default)]
pub struct TableValidator;

impl TableValidator {
    /// Create a new table validator
    ///
    /// # Example
    ///
    /// ```rust
    /// use reporting_etl::models::{ColumnSpec, ColumnType, TableSpec, TableType};
    /// use reporting_etl::validation::tables::TableValidator;
    ///
    /// let table = TableSpec::new(
    ///     "lookup_urltolocation",
    ///     TableType::Lookup,
    ///     vec![ColumnSpec::new("url", ColumnType::Varchar)],
    /// );
    /// let violations = TableValidator::new().validate_table(&table);
    /// assert_eq!(violations.len(), 1);
    /// ```
    pub fn new() -> Self {
        Self
    }

    /// Validate one table in isolation
    pub fn validate_table(&self, table: &TableSpec) -> Vec<SpecViolation> {
        let mut violations = Vec::new();
        let table_name = table.qualified_name();

        let mut seen = HashSet::new();
        for column in &table.columns {
            if column.column_type == ColumnType::Varchar && column.length.is_none() {
                violations.push(SpecViolation {
                    table: table_name.clone(),
                    column: Some(column.name.clone()),
                    kind: ViolationKind::MissingLength,
                    message: format!(
                        "Column '{}' on table '{}' is varchar without a length",
                        column.name, table_name
                    ),
                });
            }
            if !seen.insert(column.name.as_str()) {
                violations.push(SpecViolation {
                    table: table_name.clone(),
                    column: Some(column.name.clone()),
                    kind: ViolationKind::DuplicateColumn,
                    message: format!(
                        "Column '{}' is declared twice on table '{}'",
                        column.name, table_name
                    ),
                });
            }
        }

        if table.table_type.requires_clustering() {
            let clustered = table.indexes.iter().filter(|i| i.clustered).count();
            if clustered != 1 {
                violations.push(SpecViolation {
                    table: table_name.clone(),
                    column: None,
                    kind: ViolationKind::ClusteringIndex,
                    message: format!(
                        "Table '{}' is {} and must declare exactly one clustering index, found {}",
                        table_name, table.table_type, clustered
                    ),
                });
            }
        }

        for index in &table.indexes {
            for column in &index.columns {
                if !table.has_column(&column.name) {
                    violations.push(SpecViolation {
                        table: table_name.clone(),
                        column: Some(column.name.clone()),
                        kind: ViolationKind::UnknownIndexColumn,
                        message: format!(
                            "Index '{}' on table '{}' references unknown column '{}'",
                            index.name, table_name, column.name
                        ),
                    });
                }
            }
        }

        if !table.update_types.is_empty() && !table.has_column(&table.exact_column) {
            violations.push(SpecViolation {
                table: table_name.clone(),
                column: Some(table.exact_column.clone()),
                kind: ViolationKind::MissingExactColumn,
                message: format!(
                    "Lookup table '{}' declares update types but no '{}' column",
                    table_name, table.exact_column
                ),
            });
        }

        violations
    }

    /// Validate a set of tables, including identity uniqueness
    pub fn validate_tables<'a>(
        &self,
        tables: impl IntoIterator<Item = &'a TableSpec>,
    ) -> TableValidationResult {
        let mut result = TableValidationResult::default();
        let mut identities = HashSet::new();

        for table in tables {
            if !identities.insert((table.schema.clone(), table.name.clone())) {
                result.violations.push(SpecViolation {
                    table: table.qualified_name(),
                    column: None,
                    kind: ViolationKind::DuplicateTable,
                    message: format!("Table '{}' is declared twice", table.qualified_name()),
                });
            }
            result.violations.extend(self.validate_table(table));
        }

        result
    }
}
