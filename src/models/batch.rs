//! Batch: the rectangular ingest unit
//!
//! A batch is produced by a source pull (or a worksheet snapshot), run through
//! the processing stages and consumed once by the ingest or refresh engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::value::parse_date;
use crate::error::{EtlError, EtlResult};

/// Normalise a sheet or API header: trimmed, lowercase, spaces as underscores
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Rectangular set of rows with named columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Batch {
    /// Create an empty batch with the given columns
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Create a batch from column names and rows, checking every row's width
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> EtlResult<Self> {
        let mut batch = Self::new(columns);
        for row in rows {
            batch.push_row(row)?;
        }
        Ok(batch)
    }

    /// Create a batch from JSON objects
    ///
    /// Columns are the union of all keys in first-seen order; keys missing from
    /// a record become NULL.
    pub fn from_records(records: &[Value]) -> EtlResult<Self> {
        let mut columns: Vec<String> = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let object = record.as_object().ok_or_else(|| {
                EtlError::InvalidBatch(format!("Record {} is not a JSON object", i))
            })?;
            for key in object.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .filter_map(|r| r.as_object())
            .map(|object| {
                columns
                    .iter()
                    .map(|c| object.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    /// Convert back to JSON objects
    pub fn to_records(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let map: serde_json::Map<String, Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                Value::Object(map)
            })
            .collect()
    }

    /// Append a row; its width must match the column count
    pub fn push_row(&mut self, row: Vec<Value>) -> EtlResult<()> {
        if row.len() != self.columns.len() {
            return Err(EtlError::InvalidBatch(format!(
                "Row has {} values but the batch has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Value at a row and column, if both exist
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Rename one column; renaming a missing column is a no-op
    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(idx) = self.column_index(from) {
            self.columns[idx] = to.to_string();
        }
    }

    /// Apply `f` to every column name
    pub fn map_column_names<F>(&mut self, f: F)
    where
        F: Fn(&str) -> String,
    {
        for column in &mut self.columns {
            *column = f(column);
        }
    }

    /// Drop the named columns, ignoring names that are absent
    pub fn drop_columns(&mut self, names: &[String]) {
        let keep: Vec<bool> = self.columns.iter().map(|c| !names.contains(c)).collect();
        self.retain_columns(&keep);
    }

    /// Keep only the columns for which `predicate` returns true
    pub fn retain_columns_where<F>(&mut self, predicate: F)
    where
        F: Fn(&str) -> bool,
    {
        let keep: Vec<bool> = self.columns.iter().map(|c| predicate(c)).collect();
        self.retain_columns(&keep);
    }

    fn retain_columns(&mut self, keep: &[bool]) {
        let mut flags = keep.iter();
        self.columns.retain(|_| *flags.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut flags = keep.iter();
            row.retain(|_| *flags.next().unwrap_or(&true));
        }
    }

    /// Set a column to a constant, adding it when absent
    pub fn set_column(&mut self, name: &str, value: Value) {
        match self.column_index(name) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = value.clone();
                }
            }
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(value.clone());
                }
            }
        }
    }

    /// Replace every value of a column with `f(value)`
    pub fn map_column<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&Value) -> Value,
    {
        if let Some(idx) = self.column_index(name) {
            for row in &mut self.rows {
                row[idx] = f(&row[idx]);
            }
        }
    }

    /// Keep only the rows for which `predicate` returns true
    pub fn retain_rows<F>(&mut self, predicate: F)
    where
        F: Fn(&[Value]) -> bool,
    {
        self.rows.retain(|row| predicate(row.as_slice()));
    }

    /// Minimum and maximum date of a column
    ///
    /// Returns `Ok(None)` for an empty batch. Every row must carry a parseable
    /// date; a missing column or an unparseable cell is an error.
    pub fn date_range(&self, column: &str) -> EtlResult<Option<(NaiveDate, NaiveDate)>> {
        let idx = self.column_index(column).ok_or_else(|| {
            EtlError::InvalidBatch(format!("Date column '{}' not found in batch", column))
        })?;

        let mut range: Option<(NaiveDate, NaiveDate)> = None;
        for (i, row) in self.rows.iter().enumerate() {
            let date = parse_date(&row[idx]).ok_or_else(|| {
                EtlError::InvalidBatch(format!(
                    "Row {} has no parseable date in '{}': {}",
                    i, column, row[idx]
                ))
            })?;
            range = Some(match range {
                None => (date, date),
                Some((min, max)) => (min.min(date), max.max(date)),
            });
        }

        Ok(range)
    }
}
