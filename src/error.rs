//! Error types shared by the engines

use crate::database::DatabaseError;

/// Error type for provisioning, ingest, refresh and backfilter operations
///
/// Configuration errors are fatal and raised at setup or schema-build time.
/// Everything else is an I/O failure that propagates to the caller unchanged;
/// nothing in the library retries.
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    /// Missing or inconsistent configuration (never silently defaulted)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Batch is malformed (ragged rows, missing or unparseable date column)
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    /// Warehouse failure
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Upstream source (API client or spreadsheet) failure
    #[error("Source error: {0}")]
    Source(String),

    /// File system failure
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EtlError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether this error is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<std::io::Error> for EtlError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Result type for engine operations
pub type EtlResult<T> = Result<T, EtlError>;
