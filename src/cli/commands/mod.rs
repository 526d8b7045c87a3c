//! CLI command implementations

pub mod init;
pub mod queue;
pub mod run;
pub mod warehouse;

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};

use crate::cli::error::CliError;
use crate::database::{DatabaseBackend, EtlConfig, connect};
use crate::registry::{RegistryOptions, SchemaRegistry};

/// Load the configuration file, or discover it in the working directory
pub fn load_config(path: Option<&Path>) -> Result<EtlConfig, CliError> {
    let config = match path {
        Some(path) => EtlConfig::load(path)?,
        None => {
            let cwd = std::env::current_dir()
                .map_err(|e| CliError::IoError(format!("Failed to get current directory: {}", e)))?;
            EtlConfig::discover(&cwd)?
        }
    };
    Ok(config)
}

/// Path of the configuration file to hand to child processes
pub fn config_path(path: Option<&Path>) -> Result<PathBuf, CliError> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => std::env::current_dir()
            .map(|cwd| cwd.join(crate::database::config::CONFIG_FILENAME))
            .map_err(|e| CliError::IoError(format!("Failed to get current directory: {}", e))),
    }
}

/// The date a run is computed from: the override, else the local date
pub fn run_date(today: Option<NaiveDate>) -> NaiveDate {
    today.unwrap_or_else(|| Local::now().date_naive())
}

pub fn load_registry(config: &EtlConfig) -> Result<SchemaRegistry, CliError> {
    let registry = SchemaRegistry::load(
        &config.schema_path(),
        RegistryOptions {
            custom_columns_enabled: config.master.custom_columns_enabled,
        },
    )?;
    Ok(registry)
}

pub async fn open_warehouse(config: &EtlConfig) -> Result<Box<dyn DatabaseBackend>, CliError> {
    tracing::info!(
        warehouse = %config.warehouse.masked_connection_string(),
        "Connecting to warehouse"
    );
    Ok(connect(&config.warehouse).await?)
}

pub fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))
}

/// Print a report as pretty JSON on stdout
pub fn print_report<T: serde::Serialize>(report: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| CliError::IoError(format!("Failed to serialize report: {}", e)))?;
    println!("{}", json);
    Ok(())
}
