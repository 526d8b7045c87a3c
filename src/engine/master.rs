//! Master table rebuild
//!
//! The master table is the union of every active reporting table over the
//! master's derived column set. A rebuild replaces its contents in one
//! transaction; reporting tables lacking a master column contribute a typed
//! NULL for it.

use crate::database::sql::{column_type_sql, qualified_table, quote_ident};
use crate::database::{DatabaseBackend, Dialect};
use crate::error::{EtlError, EtlResult};
use crate::models::TableSpec;
use crate::registry::SchemaRegistry;

/// `SELECT` projecting `source` onto the master columns
fn union_branch(master: &TableSpec, source: &TableSpec, dialect: Dialect) -> String {
    let projection: Vec<String> = master
        .columns
        .iter()
        .map(|column| {
            let name = quote_ident(&column.name);
            if source.has_column(&column.name) {
                name
            } else {
                format!(
                    "CAST(NULL AS {}) AS {}",
                    column_type_sql(column, dialect),
                    name
                )
            }
        })
        .collect();
    format!(
        "SELECT {} FROM {}",
        projection.join(", "),
        qualified_table(source)
    )
}

/// Statements rebuilding the master table
///
/// Returns `DELETE FROM master` followed by one `INSERT ... SELECT` unioning
/// the active reporting tables, or only the DELETE when there are none.
pub fn master_rebuild_statements(
    registry: &SchemaRegistry,
    dialect: Dialect,
) -> EtlResult<Vec<String>> {
    let master = registry
        .master()
        .ok_or_else(|| EtlError::config("No master table is declared"))?;

    let mut statements = vec![format!("DELETE FROM {}", qualified_table(master))];

    let branches: Vec<String> = registry
        .reporting_tables()
        .map(|table| union_branch(master, table, dialect))
        .collect();
    if branches.is_empty() || master.columns.is_empty() {
        return Ok(statements);
    }

    let columns: Vec<String> = master.columns.iter().map(|c| quote_ident(&c.name)).collect();
    statements.push(format!(
        "INSERT INTO {} ({})\n{}",
        qualified_table(master),
        columns.join(", "),
        branches.join("\nUNION ALL\n")
    ));

    Ok(statements)
}

/// Rebuild the master table; returns the number of rows inserted
pub async fn rebuild_master(
    backend: &dyn DatabaseBackend,
    registry: &SchemaRegistry,
) -> EtlResult<u64> {
    let statements = master_rebuild_statements(registry, backend.dialect())?;
    let counts = backend.execute_transaction(&statements).await?;
    let rows: u64 = counts.iter().skip(1).sum();

    tracing::info!(
        sources = registry.reporting_tables().count(),
        rows,
        "Master table rebuilt"
    );

    Ok(rows)
}
