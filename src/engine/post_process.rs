//! Post-processing SQL scripts
//!
//! Scripts live in one directory and are named `<order>_<description>.sql`.
//! A script runs for a data source when its file name contains the data
//! source's script name. Matching scripts execute in ascending order of their
//! integer prefix, each in its own transaction.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::database::DatabaseBackend;
use crate::error::{EtlError, EtlResult};

static SCRIPT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)[_-].*\.sql$").expect("Invalid regex"));

/// One discovered script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostProcessingScript {
    pub order: u64,
    pub path: PathBuf,
}

impl PostProcessingScript {
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

/// Parse the execution order from a script file name
///
/// Returns `None` for names without an integer prefix or `.sql` suffix.
pub fn script_order(file_name: &str) -> Option<u64> {
    SCRIPT_NAME
        .captures(file_name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Scripts in `dir` whose name contains `script_name`, in execution order
///
/// A missing directory yields no scripts. Equal prefixes are ordered by name.
pub fn discover_scripts(dir: &Path, script_name: &str) -> EtlResult<Vec<PostProcessingScript>> {
    if !dir.exists() {
        tracing::debug!(dir = %dir.display(), "No post-processing directory");
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| {
        EtlError::Io(format!(
            "Failed to read post-processing directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let mut scripts = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !file_name.contains(script_name) {
            continue;
        }
        if let Some(order) = script_order(file_name) {
            scripts.push(PostProcessingScript { order, path });
        }
    }

    scripts.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.path.cmp(&b.path)));
    Ok(scripts)
}

/// Run one script inside its own transaction
pub async fn run_script(
    backend: &dyn DatabaseBackend,
    script: &PostProcessingScript,
) -> EtlResult<()> {
    let sql = tokio::fs::read_to_string(&script.path).await.map_err(|e| {
        EtlError::Io(format!("Failed to read {}: {}", script.path.display(), e))
    })?;

    if sql.trim().is_empty() {
        tracing::warn!(script = script.file_name(), "Skipping empty post-processing script");
        return Ok(());
    }

    backend.execute_script_transaction(&sql).await?;
    tracing::info!(
        script = script.file_name(),
        order = script.order,
        "Post-processing script applied"
    );
    Ok(())
}

/// Discover and run the post-processing scripts for `script_name`
///
/// Stops at the first failing script; earlier scripts stay committed.
pub async fn run_post_processing_scripts(
    backend: &dyn DatabaseBackend,
    dir: &Path,
    script_name: &str,
) -> EtlResult<Vec<PostProcessingScript>> {
    let scripts = discover_scripts(dir, script_name)?;
    for script in &scripts {
        run_script(backend, script).await?;
    }
    Ok(scripts)
}
