//! Source seams
//!
//! Upstream API connectors and the configuration workbook are external
//! collaborators. The engines only see these two traits; the JSON file
//! implementations here serve local runs and tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::error::{EtlError, EtlResult};
use crate::models::{Batch, parse_date};

/// Pulls a batch from an upstream reporting API
///
/// A zero-row batch means "no data" and is not an error.
#[async_trait(?Send)]
pub trait SourceClient {
    async fn pull(&self, start: NaiveDate, end: NaiveDate) -> EtlResult<Batch>;
}

/// Reads a full worksheet snapshot from the configuration workbook
#[async_trait(?Send)]
pub trait WorksheetSource {
    async fn get_worksheet(&self, workbook: &str, worksheet: &str) -> EtlResult<Batch>;
}

async fn read_records(path: &Path) -> EtlResult<Vec<Value>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| EtlError::Source(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content).map_err(|e| {
        EtlError::Serialization(format!(
            "{} is not a JSON array of records: {}",
            path.display(),
            e
        ))
    })
}

/// Source backed by a JSON file holding an array of records
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    date_field: Option<String>,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            date_field: None,
        }
    }

    /// Keep only records whose `field` falls inside the pulled window
    pub fn with_date_field(mut self, field: impl Into<String>) -> Self {
        self.date_field = Some(field.into());
        self
    }
}

#[async_trait(?Send)]
impl SourceClient for JsonFileSource {
    async fn pull(&self, start: NaiveDate, end: NaiveDate) -> EtlResult<Batch> {
        let mut records = read_records(&self.path).await?;

        if let Some(field) = &self.date_field {
            records.retain(|record| {
                record
                    .get(field)
                    .and_then(parse_date)
                    .is_some_and(|d| d >= start && d <= end)
            });
        }

        tracing::debug!(
            path = %self.path.display(),
            %start,
            %end,
            records = records.len(),
            "Pulled records from file"
        );

        Batch::from_records(&records)
    }
}

/// Workbook snapshots stored as `<root>/<workbook>/<worksheet>.json`
#[derive(Debug, Clone)]
pub struct DirectoryWorkbookSource {
    root: PathBuf,
}

impl DirectoryWorkbookSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn worksheet_path(&self, workbook: &str, worksheet: &str) -> PathBuf {
        self.root.join(workbook).join(format!("{}.json", worksheet))
    }
}

#[async_trait(?Send)]
impl WorksheetSource for DirectoryWorkbookSource {
    async fn get_worksheet(&self, workbook: &str, worksheet: &str) -> EtlResult<Batch> {
        let records = read_records(&self.worksheet_path(workbook, worksheet)).await?;
        Batch::from_records(&records)
    }
}
