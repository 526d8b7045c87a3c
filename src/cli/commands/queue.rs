//! Queue runner
//!
//! Runs the dimension refresh check once, then launches every configured data
//! source as a blocking child `run` process, one after the other. Children
//! inherit [`REFRESHED_ENV`] so they skip the refresh the parent performed.
//! A failing child does not stop the queue; the queue fails at the end.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use uuid::Uuid;

use super::{config_path, load_config, load_registry, open_warehouse, run_date, runtime};
use crate::cli::error::CliError;
use crate::engine::refresh::{REFRESHED_ENV, RefreshEngine, RefreshLatch};
use crate::sources::DirectoryWorkbookSource;

/// Queue command arguments
#[derive(Debug, Clone)]
pub struct QueueArgs {
    pub config: Option<PathBuf>,
    pub today: Option<NaiveDate>,
    /// Forwarded to every child
    pub expedited: bool,
}

fn run_child(
    exe: &Path,
    config: &Path,
    script: &str,
    today: NaiveDate,
    expedited: bool,
) -> Result<ExitStatus> {
    let mut command = Command::new(exe);
    command
        .arg("--config")
        .arg(config)
        .arg("run")
        .arg(script)
        .arg("--today")
        .arg(today.to_string())
        .arg("--expedited")
        .arg(if expedited { "1" } else { "0" })
        .env(REFRESHED_ENV, "1");

    command
        .status()
        .with_context(|| format!("failed to launch '{}' for {}", exe.display(), script))
}

/// Refresh once, then run every queued data source in order
pub fn handle_queue(args: &QueueArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let config_file = config_path(args.config.as_deref())?;
    let today = run_date(args.today);
    let queue_id = Uuid::new_v4();

    if config.queue.scripts.is_empty() {
        tracing::warn!("Queue is empty");
        return Ok(());
    }

    if !args.expedited {
        let registry = load_registry(&config)?;
        runtime()?.block_on(async {
            let backend = open_warehouse(&config).await?;
            let workbook = DirectoryWorkbookSource::new(config.workbook_dir());
            let latch = RefreshLatch::process();
            RefreshEngine::new(backend.as_ref(), &workbook, &config.refresh, &latch)
                .refresh_if_due(&registry, today)
                .await?;
            backend.close().await?;
            Ok::<(), CliError>(())
        })?;
    }

    let exe = std::env::current_exe()
        .map_err(|e| CliError::IoError(format!("Failed to locate executable: {}", e)))?;

    let mut failed = Vec::new();
    for script in &config.queue.scripts {
        tracing::info!(%queue_id, %script, "Launching queued script");
        match run_child(&exe, &config_file, script, today, args.expedited) {
            Ok(status) if status.success() => {
                tracing::info!(%queue_id, %script, "Queued script finished");
            }
            Ok(status) => {
                tracing::error!(%queue_id, %script, code = ?status.code(), "Queued script failed");
                failed.push(script.clone());
            }
            Err(e) => {
                tracing::error!(%queue_id, %script, error = %format!("{:#}", e), "Queued script failed");
                failed.push(script.clone());
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::QueueFailed(format!(
            "{} of {} scripts failed: {}",
            failed.len(),
            config.queue.scripts.len(),
            failed.join(", ")
        )))
    }
}
