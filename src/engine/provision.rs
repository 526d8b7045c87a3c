//! Table provisioner
//!
//! Creates each declared table once. An existing table is left untouched and
//! only compared against its declaration; nothing is ever altered.

use serde::{Deserialize, Serialize};

use crate::database::ddl::table_ddl;
use crate::database::drift::{detect_schema_drift, report_drift};
use crate::database::{DatabaseBackend, DatabaseError};
use crate::error::EtlResult;
use crate::models::TableSpec;
use crate::registry::SchemaRegistry;

/// Outcome of [`ensure_table`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionOutcome {
    Created,
    AlreadyExists,
}

/// Tables created and skipped by [`provision_all`]
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

impl ProvisionReport {
    fn record(&mut self, table: &TableSpec, outcome: ProvisionOutcome) {
        match outcome {
            ProvisionOutcome::Created => self.created.push(table.qualified_name()),
            ProvisionOutcome::AlreadyExists => self.existing.push(table.qualified_name()),
        }
    }
}

/// Create `table` unless it already exists
///
/// CREATE TABLE and its indexes run in one transaction, so a failing index
/// leaves no table behind. CLUSTER statements follow individually once the
/// table is committed.
pub async fn ensure_table(
    backend: &dyn DatabaseBackend,
    table: &TableSpec,
) -> EtlResult<ProvisionOutcome> {
    if backend.table_exists(&table.schema, &table.name).await? {
        if let Some(drift) = detect_schema_drift(backend, table).await? {
            report_drift(table, &drift);
        }
        tracing::debug!(table = %table.qualified_name(), "Table already exists");
        return Ok(ProvisionOutcome::AlreadyExists);
    }

    let ddl = table_ddl(table, backend.dialect());

    backend
        .execute_transaction(&ddl.create)
        .await
        .map_err(|e| {
            DatabaseError::MigrationFailed(format!(
                "Failed to create table {}: {}",
                table.qualified_name(),
                e
            ))
        })?;

    for statement in &ddl.cluster {
        backend.execute(statement).await.map_err(|e| {
            DatabaseError::MigrationFailed(format!(
                "Failed to cluster table {}: {}",
                table.qualified_name(),
                e
            ))
        })?;
    }

    tracing::info!(
        table = %table.qualified_name(),
        columns = table.columns.len(),
        indexes = table.indexes.len(),
        "Created table"
    );

    Ok(ProvisionOutcome::Created)
}

/// Ensure every active table exists, then the master table
pub async fn provision_all(
    backend: &dyn DatabaseBackend,
    registry: &SchemaRegistry,
) -> EtlResult<ProvisionReport> {
    let mut report = ProvisionReport::default();

    for table in registry.active_tables() {
        let outcome = ensure_table(backend, table).await?;
        report.record(table, outcome);
    }

    if let Some(master) = registry.master() {
        let outcome = ensure_table(backend, master).await?;
        report.record(master, outcome);
    }

    tracing::info!(
        created = report.created.len(),
        existing = report.existing.len(),
        "Provisioning complete"
    );

    Ok(report)
}
