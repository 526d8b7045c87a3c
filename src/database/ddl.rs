//! DDL generation for warehouse tables
//!
//! Builds CREATE TABLE, CREATE INDEX and CLUSTER statements from a
//! [`TableSpec`]. The dialect decides which PostgreSQL-only clauses are
//! emitted.

use super::Dialect;
use super::sql::{column_type_sql, qualified_table, quote_ident, render_literal};
use crate::models::{IndexSpec, TableSpec};

/// Statements that create one table
#[derive(Debug, Clone, PartialEq)]
pub struct TableDdl {
    /// CREATE TABLE, owner and CREATE INDEX statements, run in one transaction
    pub create: Vec<String>,
    /// CLUSTER statements, run afterwards one by one
    pub cluster: Vec<String>,
}

/// CREATE TABLE with columns in declared order
pub fn create_table_sql(table: &TableSpec, dialect: Dialect) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|column| {
            let mut definition = format!(
                "    {} {}",
                quote_ident(&column.name),
                column_type_sql(column, dialect)
            );
            if let Some(default) = &column.default
                && !default.is_null()
            {
                definition.push_str(" DEFAULT ");
                definition.push_str(&render_literal(default, column));
            }
            definition
        })
        .collect();

    format!(
        "CREATE TABLE {} (\n{}\n)",
        qualified_table(table),
        columns.join(",\n")
    )
}

/// CREATE INDEX for one index of `table`
pub fn create_index_sql(table: &TableSpec, index: &IndexSpec, dialect: Dialect) -> String {
    let columns: Vec<String> = index
        .columns
        .iter()
        .map(|column| {
            if dialect.supports_index_options() {
                let mut part = format!("{} {}", quote_ident(&column.name), column.sort);
                if column.nulls_last {
                    part.push_str(" NULLS LAST");
                }
                part
            } else {
                quote_ident(&column.name)
            }
        })
        .collect();

    let mut sql = format!(
        "CREATE INDEX {} ON {}",
        quote_ident(&index.name),
        qualified_table(table)
    );
    if dialect.supports_index_options() {
        sql.push_str(&format!(" USING {}", index.method));
    }
    sql.push_str(&format!(" ({})", columns.join(", ")));
    if dialect.supports_index_options()
        && let Some(tablespace) = &index.tablespace
    {
        sql.push_str(&format!(" TABLESPACE {}", quote_ident(tablespace)));
    }
    sql
}

/// CLUSTER statement for a clustered index, where the dialect supports it
pub fn cluster_sql(table: &TableSpec, index: &IndexSpec, dialect: Dialect) -> Option<String> {
    (index.clustered && dialect.supports_cluster()).then(|| {
        format!(
            "CLUSTER {} USING {}",
            qualified_table(table),
            quote_ident(&index.name)
        )
    })
}

/// ALTER TABLE ... OWNER TO, where the dialect supports it
pub fn owner_sql(table: &TableSpec, dialect: Dialect) -> Option<String> {
    let owner = table.owner.as_ref()?;
    dialect
        .supports_owner()
        .then(|| format!("ALTER TABLE {} OWNER TO {}", qualified_table(table), quote_ident(owner)))
}

/// Every statement needed to create `table`, indexes in declared order
pub fn table_ddl(table: &TableSpec, dialect: Dialect) -> TableDdl {
    let mut create = vec![create_table_sql(table, dialect)];
    if let Some(owner) = owner_sql(table, dialect) {
        create.push(owner);
    }
    create.extend(
        table
            .indexes
            .iter()
            .map(|index| create_index_sql(table, index, dialect)),
    );

    let cluster = table
        .indexes
        .iter()
        .filter_map(|index| cluster_sql(table, index, dialect))
        .collect();

    TableDdl { create, cluster }
}
