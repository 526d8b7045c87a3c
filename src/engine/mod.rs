//! Warehouse engines
//!
//! Each engine is a set of free functions over a [`DatabaseBackend`](crate::database::DatabaseBackend)
//! and the [`SchemaRegistry`](crate::registry::SchemaRegistry). Within one
//! run they execute in a fixed order: provision, refresh, ingest, backfilter,
//! post-processing.

pub mod backfilter;
pub mod ingest;
pub mod master;
pub mod post_process;
pub mod provision;
pub mod refresh;

pub use backfilter::{
    BackfilterReport, BackfilterStatement, StatementKind, build_backfilter_statements,
    resolve_lookup, run_backfilter, table_backfilter,
};
pub use ingest::{IngestOutcome, IngestScope, ingest_rolling};
pub use master::{master_rebuild_statements, rebuild_master};
pub use post_process::{PostProcessingScript, discover_scripts, run_post_processing_scripts};
pub use provision::{ProvisionOutcome, ProvisionReport, ensure_table, provision_all};
pub use refresh::{
    REFRESHED_ENV, RefreshEngine, RefreshLatch, RefreshReport, TableRefresh, is_refresh_due,
};
