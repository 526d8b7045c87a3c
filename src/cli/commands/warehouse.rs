//! Warehouse maintenance commands
//!
//! Each command runs one engine on its own, outside the full run lifecycle.

use std::path::PathBuf;

use chrono::NaiveDate;

use super::{load_config, load_registry, open_warehouse, print_report, run_date, runtime};
use crate::cli::error::CliError;
use crate::customizer::{SetupOptions, setup};
use crate::engine::master::rebuild_master;
use crate::engine::provision::provision_all;
use crate::engine::refresh::{RefreshEngine, RefreshLatch};
use crate::pipeline::Stage;
use crate::sources::DirectoryWorkbookSource;

/// Provision command arguments
#[derive(Debug, Clone)]
pub struct ProvisionArgs {
    pub config: Option<PathBuf>,
}

/// Create every missing table
pub fn handle_provision(args: &ProvisionArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let registry = load_registry(&config)?;

    runtime()?.block_on(async {
        let backend = open_warehouse(&config).await?;
        let report = provision_all(backend.as_ref(), &registry).await?;
        backend.close().await?;
        print_report(&report)
    })
}

/// Refresh command arguments
#[derive(Debug, Clone)]
pub struct RefreshArgs {
    pub config: Option<PathBuf>,
    /// Refresh even when today is not a refresh day
    pub force: bool,
    pub today: Option<NaiveDate>,
}

/// Refresh lookup and source tables from the workbook
pub fn handle_refresh(args: &RefreshArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let registry = load_registry(&config)?;
    let today = run_date(args.today);

    runtime()?.block_on(async {
        let backend = open_warehouse(&config).await?;
        let workbook = DirectoryWorkbookSource::new(config.workbook_dir());
        let latch = RefreshLatch::process();
        let engine = RefreshEngine::new(backend.as_ref(), &workbook, &config.refresh, &latch);

        let report = if args.force {
            engine.force(&registry).await?
        } else {
            engine.refresh_if_due(&registry, today).await?
        };
        backend.close().await?;
        print_report(&report)
    })
}

/// Arguments of the commands scoped to one data source
#[derive(Debug, Clone)]
pub struct DataSourceArgs {
    pub config: Option<PathBuf>,
    pub data_source: String,
}

/// Run the backfilter for one data source's table
pub fn handle_backfilter(args: &DataSourceArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;

    runtime()?.block_on(async {
        let customizer = setup(
            &config,
            &args.data_source,
            SetupOptions::new(run_date(None)).expedited(true),
        )
        .await?;
        let report = customizer.table_backfilter().await?;
        customizer.close().await?;
        print_report(&report)
    })
}

/// Run the post-processing scripts for one data source
pub fn handle_post_process(args: &DataSourceArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;

    runtime()?.block_on(async {
        let customizer = setup(
            &config,
            &args.data_source,
            SetupOptions::new(run_date(None)).expedited(true),
        )
        .await?;
        let ran = customizer
            .run_post_processing(&[Stage::PostProcessing])
            .await?;
        customizer.close().await?;
        print_report(&serde_json::json!({ "post_processed": ran }))
    })
}

/// Master command arguments
#[derive(Debug, Clone)]
pub struct MasterArgs {
    pub config: Option<PathBuf>,
}

/// Rebuild the master table from the reporting tables
pub fn handle_master(args: &MasterArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let registry = load_registry(&config)?;

    runtime()?.block_on(async {
        let backend = open_warehouse(&config).await?;
        let rows = rebuild_master(backend.as_ref(), &registry).await?;
        backend.close().await?;
        print_report(&serde_json::json!({ "rows": rows }))
    })
}
