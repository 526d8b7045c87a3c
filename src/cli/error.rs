//! CLI-specific error types

use crate::database::DatabaseError;
use crate::error::EtlError;
use std::path::PathBuf;
use thiserror::Error;

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to load configuration: {0}")]
    ConfigError(String),

    #[error("File already exists: {0} (use --force to overwrite)")]
    FileExists(PathBuf),

    #[error("Failed to write file {0}: {1}")]
    FileWriteError(PathBuf, String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Queue failed: {0}")]
    QueueFailed(String),

    #[error(transparent)]
    Etl(#[from] EtlError),
}

impl From<DatabaseError> for CliError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::ConfigError(msg) => CliError::ConfigError(msg),
            other => CliError::Etl(EtlError::Database(other)),
        }
    }
}
