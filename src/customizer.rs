//! Customizer: the per data source run context
//!
//! [`setup`] resolves a data source from the configuration, loads the schema
//! registry, connects to the warehouse, provisions the tables and refreshes
//! the dimensions when due. The returned [`Customizer`] carries everything a
//! script needs for the rest of the run and exposes the run operations in
//! their mandated order: pull, processing, ingest, backfilter, post-processing.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::config::DataSourceSection;
use crate::database::{DatabaseBackend, EtlConfig, connect};
use crate::engine::backfilter::{BackfilterReport, table_backfilter};
use crate::engine::ingest::{IngestOutcome, IngestScope, ingest_rolling, resolve_date_column};
use crate::engine::master::rebuild_master;
use crate::engine::provision::{ProvisionReport, provision_all};
use crate::engine::refresh::{RefreshEngine, RefreshLatch, RefreshReport};
use crate::error::{EtlError, EtlResult};
use crate::models::{Batch, TableSpec};
use crate::pipeline::{
    self, ColumnRenamer, SourceParser, SpecTyper, SqlScriptPostProcessor, Stage, StageHooks,
};
use crate::registry::{RegistryOptions, SchemaRegistry};
use crate::sources::{DirectoryWorkbookSource, SourceClient};

/// Options for [`setup`]
#[derive(Debug)]
pub struct SetupOptions {
    /// Skip provisioning and the dimension refresh
    pub expedited: bool,
    /// Date the refresh gate and the date window are computed from
    pub today: NaiveDate,
    pub latch: RefreshLatch,
}

impl SetupOptions {
    /// Full setup on `today` using the process-wide refresh latch
    pub fn new(today: NaiveDate) -> Self {
        Self {
            expedited: false,
            today,
            latch: RefreshLatch::process(),
        }
    }

    pub fn expedited(mut self, expedited: bool) -> Self {
        self.expedited = expedited;
        self
    }

    pub fn with_latch(mut self, latch: RefreshLatch) -> Self {
        self.latch = latch;
        self
    }
}

/// Which run steps execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSteps {
    pub pull: bool,
    pub ingest: bool,
    pub backfilter: bool,
    pub post_process: bool,
}

impl Default for RunSteps {
    fn default() -> Self {
        Self {
            pull: true,
            ingest: true,
            backfilter: true,
            post_process: true,
        }
    }
}

/// What a [`Customizer::run`] did
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub pulled: Option<usize>,
    pub ingest: Option<IngestOutcome>,
    pub backfilter: Option<BackfilterReport>,
    pub post_processed: bool,
}

/// Run context for one data source
pub struct Customizer {
    script_name: String,
    label: String,
    settings: DataSourceSection,
    registry: Arc<SchemaRegistry>,
    table: Arc<TableSpec>,
    backend: Box<dyn DatabaseBackend>,
    hooks: StageHooks,
    provisioned: Option<ProvisionReport>,
    refreshed: Option<RefreshReport>,
}

/// Resolve, connect, provision and refresh for `script_name`
///
/// An unknown data source name is a configuration error. With
/// `options.expedited` the provisioning and refresh steps are skipped.
pub async fn setup(
    config: &EtlConfig,
    script_name: &str,
    options: SetupOptions,
) -> EtlResult<Customizer> {
    require_data_source(config, script_name)?;

    let registry = SchemaRegistry::load(
        &config.schema_path(),
        RegistryOptions {
            custom_columns_enabled: config.master.custom_columns_enabled,
        },
    )?;

    tracing::info!(
        script_name,
        warehouse = %config.warehouse.masked_connection_string(),
        "Connecting to warehouse"
    );
    let backend = connect(&config.warehouse).await?;

    setup_with(config, script_name, registry, backend, options).await
}

/// [`setup`] with an already built registry and backend
pub async fn setup_with(
    config: &EtlConfig,
    script_name: &str,
    registry: SchemaRegistry,
    backend: Box<dyn DatabaseBackend>,
    options: SetupOptions,
) -> EtlResult<Customizer> {
    let settings = require_data_source(config, script_name)?.clone();
    let table = Arc::new(registry.require_table(&settings.table)?.clone());

    let date_column = resolve_date_column(&table, settings.date_column.as_deref())?
        .name
        .clone();
    if let Some(scope) = &settings.scope_column
        && !table.has_column(scope)
    {
        return Err(EtlError::Configuration(format!(
            "Scope column '{}' is not declared on table '{}'",
            scope,
            table.qualified_name()
        )));
    }

    let label = settings
        .data_source
        .clone()
        .unwrap_or_else(|| script_name.to_string());
    let hooks = default_hooks(config, script_name, &settings, &table, &date_column, &label);

    let mut customizer = Customizer {
        script_name: script_name.to_string(),
        label,
        settings,
        registry: Arc::new(registry),
        table,
        backend,
        hooks,
        provisioned: None,
        refreshed: None,
    };

    if options.expedited {
        tracing::info!(script_name, "Expedited run, skipping provisioning and refresh");
        return Ok(customizer);
    }

    customizer.provisioned =
        Some(provision_all(customizer.backend.as_ref(), &customizer.registry).await?);

    let workbook = DirectoryWorkbookSource::new(config.workbook_dir());
    let refresh = RefreshEngine::new(
        customizer.backend.as_ref(),
        &workbook,
        &config.refresh,
        &options.latch,
    );
    customizer.refreshed = Some(
        refresh
            .refresh_if_due(&customizer.registry, options.today)
            .await?,
    );

    Ok(customizer)
}

fn require_data_source<'a>(
    config: &'a EtlConfig,
    script_name: &str,
) -> EtlResult<&'a DataSourceSection> {
    config.data_source(script_name).ok_or_else(|| {
        let known: Vec<&str> = config.data_sources.keys().map(String::as_str).collect();
        EtlError::Configuration(format!(
            "Unknown data source '{}' (configured: {})",
            script_name,
            if known.is_empty() {
                "none".to_string()
            } else {
                known.join(", ")
            }
        ))
    })
}

/// Hooks for the stages a data source section configures
fn default_hooks(
    config: &EtlConfig,
    script_name: &str,
    settings: &DataSourceSection,
    table: &Arc<TableSpec>,
    date_column: &str,
    label: &str,
) -> StageHooks {
    let mut hooks = StageHooks::new()
        .with_post_processor(SqlScriptPostProcessor::new(
            config.post_processing_dir(),
            script_name,
        ));

    for stage in &settings.stages {
        match stage {
            Stage::Rename => hooks = hooks.with_renamer(ColumnRenamer::new(&settings.rename)),
            Stage::Type => hooks = hooks.with_typer(SpecTyper::new(Arc::clone(table))),
            Stage::Parse => {
                let mut parser =
                    SourceParser::new(Arc::clone(table)).with_date_column(date_column);
                if let Some(scope) = &settings.scope_column {
                    parser = parser.with_stamp(scope, label);
                }
                hooks = hooks.with_parser(parser);
            }
            Stage::PostProcessing => {}
        }
    }

    hooks
}

impl Customizer {
    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    /// Value stamped into the scope column
    pub fn data_source_label(&self) -> &str {
        &self.label
    }

    pub fn settings(&self) -> &DataSourceSection {
        &self.settings
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Target table of this data source
    pub fn table(&self) -> &TableSpec {
        &self.table
    }

    pub fn backend(&self) -> &dyn DatabaseBackend {
        self.backend.as_ref()
    }

    pub fn hooks(&self) -> &StageHooks {
        &self.hooks
    }

    /// Replace the configured stage hooks
    pub fn with_hooks(mut self, hooks: StageHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Provisioning result, `None` for expedited runs
    pub fn provision_report(&self) -> Option<&ProvisionReport> {
        self.provisioned.as_ref()
    }

    /// Refresh result, `None` for expedited runs
    pub fn refresh_report(&self) -> Option<&RefreshReport> {
        self.refreshed.as_ref()
    }

    /// Inclusive date window to pull
    ///
    /// Historical runs start at `historical_start_date`, rolling runs
    /// `rolling_days` before `today`. Both end yesterday.
    pub fn date_window(&self, today: NaiveDate) -> EtlResult<(NaiveDate, NaiveDate)> {
        let end = today - Duration::days(1);
        let start = if self.settings.historical {
            self.settings.historical_start_date.ok_or_else(|| {
                EtlError::Configuration(format!(
                    "Data source '{}' is historical but has no historical_start_date",
                    self.script_name
                ))
            })?
        } else {
            today - Duration::days(i64::from(self.settings.rolling_days))
        };

        if start > end {
            return Err(EtlError::Configuration(format!(
                "Empty date window for '{}': {} > {}",
                self.script_name, start, end
            )));
        }
        Ok((start, end))
    }

    /// Rolling-delete scope derived from `scope_column`
    pub fn ingest_scope(&self) -> IngestScope {
        match &self.settings.scope_column {
            Some(column) => IngestScope::column(column.clone(), Value::String(self.label.clone())),
            None => IngestScope::Table,
        }
    }

    /// Run the configured pre-ingest stages
    pub async fn run_processing(&self, batch: Batch) -> EtlResult<Batch> {
        self.run_stages(batch, &self.settings.stages).await
    }

    /// Run an explicit stage list
    pub async fn run_stages(&self, batch: Batch, stages: &[Stage]) -> EtlResult<Batch> {
        pipeline::run_processing(batch, &self.hooks, stages, self.backend.as_ref()).await
    }

    /// Replace the batch's date window in the target table
    pub async fn ingest_rolling(&self, batch: &Batch) -> EtlResult<IngestOutcome> {
        ingest_rolling(
            self.backend.as_ref(),
            batch,
            &self.table,
            self.settings.date_column.as_deref(),
            &self.ingest_scope(),
        )
        .await
    }

    /// Resolve entity columns on the target table
    ///
    /// A table without backfilter columns has nothing to resolve.
    pub async fn table_backfilter(&self) -> EtlResult<BackfilterReport> {
        if self.table.backfilter_columns().next().is_none() {
            tracing::info!(
                table = %self.table.qualified_name(),
                "No backfilter columns, skipping backfilter"
            );
            return Ok(BackfilterReport::default());
        }
        table_backfilter(self.backend.as_ref(), &self.registry, &self.table).await
    }

    /// Run post-processing when `stages` names it; returns whether it ran
    pub async fn run_post_processing(&self, stages: &[Stage]) -> EtlResult<bool> {
        if !stages.contains(&Stage::PostProcessing) {
            return Ok(false);
        }
        pipeline::run_post_processing(&self.hooks, self.backend.as_ref()).await
    }

    /// Rebuild the master table from the reporting tables
    pub async fn rebuild_master(&self) -> EtlResult<u64> {
        rebuild_master(self.backend.as_ref(), &self.registry).await
    }

    /// Pull, process, ingest, backfilter and post-process in that order
    ///
    /// An empty pull ends the run early with a warning.
    pub async fn run(
        &self,
        source: &dyn SourceClient,
        today: NaiveDate,
        steps: RunSteps,
    ) -> EtlResult<RunReport> {
        let mut report = RunReport::default();

        if steps.pull {
            let (start, end) = self.date_window(today)?;
            report.start = Some(start);
            report.end = Some(end);

            let batch = source.pull(start, end).await?;
            report.pulled = Some(batch.len());
            if batch.is_empty() {
                tracing::warn!(
                    script_name = %self.script_name,
                    %start,
                    %end,
                    "Source returned no rows"
                );
                return Ok(report);
            }

            let batch = self.run_processing(batch).await?;
            if steps.ingest {
                let outcome = self.ingest_rolling(&batch).await?;
                let skipped = outcome.is_skipped();
                report.ingest = Some(outcome);
                if skipped {
                    return Ok(report);
                }
            }
        }

        if steps.backfilter {
            report.backfilter = Some(self.table_backfilter().await?);
        }

        if steps.post_process {
            report.post_processed = self.run_post_processing(&[Stage::PostProcessing]).await?;
        }

        Ok(report)
    }

    /// Close the warehouse connection
    pub async fn close(&self) -> EtlResult<()> {
        self.backend.close().await?;
        Ok(())
    }
}

impl std::fmt::Debug for Customizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Customizer")
            .field("script_name", &self.script_name)
            .field("table", &self.table.qualified_name())
            .field("backend", &self.backend.backend_type())
            .field("hooks", &self.hooks)
            .finish()
    }
}
