//! Backfilter (entity resolution)
//!
//! Resolves entity columns on freshly ingested fact rows from the single
//! lookup table sharing the fact table's tablespace tag. For every backfilter
//! column the exact-match UPDATE precedes the fuzzy one. Fuzzy updates skip
//! rows whose key has an exact lookup row, so a substring match never
//! replaces an exact one, while corrected fuzzy lookup rows reach every
//! run. Defaults fill whatever is left NULL.
//!
//! Statements run one by one outside any enclosing transaction. Each is
//! idempotent, so a run aborted halfway is safe to repeat.

use serde::{Deserialize, Serialize};

use crate::database::DatabaseBackend;
use crate::database::sql::{qualified_table, quote_ident, render_literal};
use crate::error::{EtlError, EtlResult};
use crate::models::{ColumnSpec, TableSpec, TableType, UpdateType};
use crate::registry::SchemaRegistry;

/// What a generated statement does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Exact,
    Fuzzy,
    Default,
}

impl From<UpdateType> for StatementKind {
    fn from(update_type: UpdateType) -> Self {
        match update_type {
            UpdateType::Exact => StatementKind::Exact,
            UpdateType::Fuzzy => StatementKind::Fuzzy,
        }
    }
}

/// One generated UPDATE statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackfilterStatement {
    /// Target table, schema-qualified
    pub table: String,
    /// Backfilter column (join kinds) or entity column (default kind)
    pub column: String,
    pub kind: StatementKind,
    pub sql: String,
}

/// Statements executed by [`run_backfilter`]
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BackfilterReport {
    pub statements: usize,
    pub rows_updated: u64,
}

/// The one active lookup table sharing a tablespace tag with `table`
///
/// Zero or several candidates is a configuration error.
pub fn resolve_lookup<'a>(
    registry: &'a SchemaRegistry,
    table: &'a TableSpec,
) -> EtlResult<&'a TableSpec> {
    let lookups = registry.lookups_for(table);
    match lookups.as_slice() {
        [lookup] => Ok(lookup),
        [] => Err(EtlError::Configuration(format!(
            "No active lookup table shares a tablespace with '{}' (tags: {:?})",
            table.qualified_name(),
            table.tablespace
        ))),
        many => Err(EtlError::Configuration(format!(
            "{} active lookup tables share a tablespace with '{}': {}",
            many.len(),
            table.qualified_name(),
            many.iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn require_lookup_column(lookup: &TableSpec, name: &str) -> EtlResult<()> {
    if lookup.has_column(name) {
        Ok(())
    } else {
        Err(EtlError::Configuration(format!(
            "Lookup table '{}' has no column '{}'",
            lookup.qualified_name(),
            name
        )))
    }
}

/// `NOT EXISTS` an exact lookup row for the target's key
fn no_exact_match(source: &str, target_key: &str, key_name: &str, exact_column: &str) -> String {
    format!(
        "NOT EXISTS (SELECT 1 FROM {} AS exact_match WHERE exact_match.{} = {} AND exact_match.{} = 1)",
        source,
        key_name,
        target_key,
        quote_ident(exact_column)
    )
}

/// Generate the backfilter statements for `table` against `lookup`
///
/// Per backfilter column, in declared order: the exact statement, then the
/// fuzzy statement, for whichever update types the lookup declares. Then one
/// default statement per entity column carrying a default.
pub fn build_backfilter_statements(
    table: &TableSpec,
    lookup: &TableSpec,
) -> EtlResult<Vec<BackfilterStatement>> {
    if table.table_type == TableType::Lookup {
        return Err(EtlError::Configuration(format!(
            "Cannot backfilter lookup table '{}'",
            table.qualified_name()
        )));
    }

    let entities: Vec<&ColumnSpec> = table.entity_columns().collect();
    if entities.is_empty() {
        return Err(EtlError::Configuration(format!(
            "Table '{}' has no entity columns to backfilter",
            table.qualified_name()
        )));
    }
    for entity in &entities {
        require_lookup_column(lookup, &entity.name)?;
    }
    if !lookup.update_types.is_empty() {
        require_lookup_column(lookup, &lookup.exact_column)?;
    }

    let mut update_types = lookup.update_types.clone();
    update_types.sort();
    update_types.dedup();
    let has_exact = update_types.contains(&UpdateType::Exact);

    let target = qualified_table(table);
    let source = qualified_table(lookup);
    let target_ref = quote_ident(&table.name);
    let lookup_ref = quote_ident(&lookup.name);
    let exact_flag = format!("{}.{}", lookup_ref, quote_ident(&lookup.exact_column));

    let set_clause = entities
        .iter()
        .map(|e| {
            let name = quote_ident(&e.name);
            format!("{} = {}.{}", name, lookup_ref, name)
        })
        .collect::<Vec<_>>()
        .join(", ");

    let mut statements = Vec::new();

    for key in table.backfilter_columns() {
        require_lookup_column(lookup, &key.name)?;
        let key_name = quote_ident(&key.name);
        let target_key = format!("{}.{}", target_ref, key_name);
        let lookup_key = format!("{}.{}", lookup_ref, key_name);

        for update_type in &update_types {
            let predicate = match update_type {
                UpdateType::Exact => {
                    format!("{} = {} AND {} = 1", target_key, lookup_key, exact_flag)
                }
                UpdateType::Fuzzy => {
                    let mut predicate = format!(
                        "{} ILIKE '%' || {} || '%' AND {} = 0 AND {} <> ''",
                        target_key, lookup_key, exact_flag, lookup_key
                    );
                    if has_exact {
                        predicate.push_str(" AND ");
                        predicate.push_str(&no_exact_match(
                            &source,
                            &target_key,
                            &key_name,
                            &lookup.exact_column,
                        ));
                    }
                    predicate
                }
            };

            statements.push(BackfilterStatement {
                table: table.qualified_name(),
                column: key.name.clone(),
                kind: (*update_type).into(),
                sql: format!(
                    "UPDATE {} SET {} FROM {} WHERE {}",
                    target, set_clause, source, predicate
                ),
            });
        }
    }

    for entity in &entities {
        let Some(default) = entity.default.as_ref().filter(|d| !d.is_null()) else {
            continue;
        };
        let name = quote_ident(&entity.name);
        statements.push(BackfilterStatement {
            table: table.qualified_name(),
            column: entity.name.clone(),
            kind: StatementKind::Default,
            sql: format!(
                "UPDATE {} SET {} = {} WHERE {} IS NULL",
                target,
                name,
                render_literal(default, entity),
                name
            ),
        });
    }

    Ok(statements)
}

/// Execute statements in order; the first failure aborts the rest
pub async fn run_backfilter(
    backend: &dyn DatabaseBackend,
    statements: &[BackfilterStatement],
) -> EtlResult<BackfilterReport> {
    let mut report = BackfilterReport::default();

    for statement in statements {
        let rows = backend.execute(&statement.sql).await?;
        tracing::debug!(
            table = %statement.table,
            column = %statement.column,
            kind = ?statement.kind,
            rows,
            "Backfilter statement applied"
        );
        report.statements += 1;
        report.rows_updated += rows;
    }

    Ok(report)
}

/// Resolve the lookup for `table`, build its statements and run them
pub async fn table_backfilter(
    backend: &dyn DatabaseBackend,
    registry: &SchemaRegistry,
    table: &TableSpec,
) -> EtlResult<BackfilterReport> {
    let lookup = resolve_lookup(registry, table)?;
    let statements = build_backfilter_statements(table, lookup)?;
    let report = run_backfilter(backend, &statements).await?;

    tracing::info!(
        table = %table.qualified_name(),
        lookup = %lookup.qualified_name(),
        statements = report.statements,
        rows = report.rows_updated,
        "Backfilter complete"
    );

    Ok(report)
}
