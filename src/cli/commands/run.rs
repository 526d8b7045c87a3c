//! Run command: the full lifecycle for one data source

use std::path::PathBuf;

use chrono::NaiveDate;
use uuid::Uuid;

use super::{load_config, print_report, run_date, runtime};
use crate::cli::error::CliError;
use crate::customizer::{RunSteps, SetupOptions, setup};
use crate::notify::{LogNotifier, Notifier};
use crate::sources::JsonFileSource;

/// Run command arguments
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub config: Option<PathBuf>,
    /// Data source (script) name
    pub data_source: String,
    pub pull: bool,
    pub ingest: bool,
    pub backfilter: bool,
    pub post_process: bool,
    /// Skip provisioning and the dimension refresh
    pub expedited: bool,
    /// Records file overriding the configured input
    pub input: Option<PathBuf>,
    /// Field of the input records filtered to the date window
    pub date_field: Option<String>,
    pub today: Option<NaiveDate>,
}

/// Run one data source; failures are reported through the notifier
pub fn handle_run(args: &RunArgs) -> Result<(), CliError> {
    let result = run(args);
    if let Err(e) = &result {
        LogNotifier.notify_failure(&args.data_source, e);
    }
    result
}

fn run(args: &RunArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let today = run_date(args.today);
    let run_id = Uuid::new_v4();

    let span = tracing::info_span!("run", %run_id, script_name = %args.data_source);
    let _guard = span.enter();

    let steps = RunSteps {
        pull: args.pull,
        ingest: args.ingest,
        backfilter: args.backfilter,
        post_process: args.post_process,
    };

    let input = match &args.input {
        Some(path) => Some(path.clone()),
        None => config
            .data_source(&args.data_source)
            .and_then(|ds| ds.input.as_ref())
            .map(|path| config.resolve(path)),
    };
    if steps.pull && input.is_none() {
        return Err(CliError::InvalidArgument(format!(
            "No input configured for data source '{}'; pass --input",
            args.data_source
        )));
    }

    let rt = runtime()?;
    rt.block_on(async {
        let customizer = setup(
            &config,
            &args.data_source,
            SetupOptions::new(today).expedited(args.expedited),
        )
        .await?;

        let mut source = JsonFileSource::new(input.unwrap_or_default());
        if let Some(field) = &args.date_field {
            source = source.with_date_field(field.clone());
        }

        let report = customizer.run(&source, today, steps).await?;
        customizer.close().await?;

        tracing::info!(
            pulled = ?report.pulled,
            post_processed = report.post_processed,
            "Run complete"
        );
        print_report(&report)
    })
}
