//! Reporting ETL - configuration-driven warehouse lifecycle for marketing reporting
//!
//! Provides:
//! - Schema registry of lookup, source, reporting and master tables
//! - Table provisioning with drift warnings
//! - Rolling-window ingest (delete + insert in one transaction)
//! - Lookup/source refresh from the configuration workbook
//! - Backfilter entity resolution (exact, fuzzy, defaults)
//! - Processing-stage pipeline and post-processing SQL scripts
//! - PostgreSQL and DuckDB warehouses

pub mod customizer;
pub mod database;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod registry;
pub mod sources;
pub mod validation;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types
pub use customizer::{Customizer, RunReport, RunSteps, SetupOptions, setup, setup_with};
pub use database::{DatabaseBackend, DatabaseError, DatabaseResult, EtlConfig};
pub use error::{EtlError, EtlResult};
pub use models::{Batch, ColumnSpec, ColumnType, IndexSpec, TableSpec, TableType, UpdateType};
pub use notify::{LogNotifier, Notifier};
pub use pipeline::{Stage, StageHooks};
pub use registry::SchemaRegistry;
pub use sources::{SourceClient, WorksheetSource};

#[cfg(feature = "duckdb-backend")]
pub use database::DuckDBBackend;
#[cfg(feature = "postgres-backend")]
pub use database::PostgresBackend;
