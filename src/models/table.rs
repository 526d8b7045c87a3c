//! Table specification for warehouse tables

use super::column::ColumnSpec;
use super::index::IndexSpec;
use serde::{Deserialize, Serialize};

/// Role of a warehouse table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableType {
    /// Entity-mapping dimension maintained in the configuration workbook
    Lookup,
    /// Dimension or fact table maintained in the configuration workbook or fed by a source
    Source,
    /// Fact table fed by one data source
    Reporting,
    /// Cross-source union of the reporting tables
    Master,
}

impl TableType {
    /// Whether tables of this type are refreshed from the configuration workbook
    pub fn is_dimension(&self) -> bool {
        matches!(self, TableType::Lookup | TableType::Source)
    }

    /// Whether tables of this type require exactly one clustering index
    pub fn requires_clustering(&self) -> bool {
        matches!(self, TableType::Reporting | TableType::Master)
    }
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableType::Lookup => write!(f, "lookup"),
            TableType::Source => write!(f, "source"),
            TableType::Reporting => write!(f, "reporting"),
            TableType::Master => write!(f, "master"),
        }
    }
}

/// Join strategy a lookup table supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    /// Equality match on the backfilter column
    Exact,
    /// Substring (ILIKE) match on the backfilter column
    Fuzzy,
}

impl std::fmt::Display for UpdateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateType::Exact => write!(f, "exact"),
            UpdateType::Fuzzy => write!(f, "fuzzy"),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_exact_column() -> String {
    "exact".to_string()
}

/// Table specification
///
/// Identity is `(schema, name)`. Tables are created once from this description
/// and never altered afterwards; schema changes require recreating the table.
///
/// # Example
///
/// ```rust
/// use reporting_etl::models::{ColumnSpec, ColumnType, TableSpec, TableType};
///
/// let table = TableSpec::new(
///     "moz_pro_rankings",
///     TableType::Source,
///     vec![
///         ColumnSpec::new("report_date", ColumnType::Date).with_ingest_indicator(),
///         ColumnSpec::varchar("url", 500).with_backfilter(),
///     ],
/// );
/// assert_eq!(table.ingest_column().map(|c| c.name.as_str()), Some("report_date"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSpec {
    /// Table name
    pub name: String,
    /// Schema name (filled from the registry default when empty)
    #[serde(default)]
    pub schema: String,
    /// Table role
    #[serde(rename = "type")]
    pub table_type: TableType,
    /// Tablespace tags grouping related lookup, source and reporting tables
    #[serde(default)]
    pub tablespace: Vec<String>,
    /// Inactive tables are ignored by every engine
    #[serde(default = "default_true")]
    pub active: bool,
    /// Columns in declared order
    pub columns: Vec<ColumnSpec>,
    /// Indexes in declared order
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    /// Table owner role (PostgreSQL only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Join strategies generated against this table (lookup only)
    #[serde(default)]
    pub update_types: Vec<UpdateType>,
    /// Name of the 0/1 column selecting exact or fuzzy rows (lookup only)
    #[serde(default = "default_exact_column")]
    pub exact_column: String,
    /// Worksheet holding this table's rows (defaults to the table name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worksheet: Option<String>,
}

impl TableSpec {
    /// Create an active table with no indexes in the default schema
    pub fn new(name: impl Into<String>, table_type: TableType, columns: Vec<ColumnSpec>) -> Self {
        Self {
            name: name.into(),
            schema: String::new(),
            table_type,
            tablespace: Vec::new(),
            active: true,
            columns,
            indexes: Vec::new(),
            owner: None,
            update_types: Vec::new(),
            exact_column: default_exact_column(),
            worksheet: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_tablespace(mut self, tags: &[&str]) -> Self {
        self.tablespace = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_update_types(mut self, update_types: &[UpdateType]) -> Self {
        self.update_types = update_types.to_vec();
        self
    }

    /// Schema-qualified name, e.g. `public.moz_pro_rankings`
    pub fn qualified_name(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }

    /// Get a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether a column with this name is declared
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Columns used as join keys against the lookup table
    pub fn backfilter_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.backfilter)
    }

    /// Columns whose values come from the lookup table
    pub fn entity_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.entity_col)
    }

    /// The column keying the rolling ingest window, if one is flagged
    pub fn ingest_column(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.ingest_indicator)
    }

    /// The clustering index, if one is declared
    pub fn clustering_index(&self) -> Option<&IndexSpec> {
        self.indexes.iter().find(|i| i.clustered)
    }

    /// Whether this table shares at least one tablespace tag with `other`
    pub fn shares_tablespace(&self, other: &TableSpec) -> bool {
        self.tablespace.iter().any(|t| other.tablespace.contains(t))
    }

    /// Worksheet name in the configuration workbook
    pub fn worksheet_name(&self) -> &str {
        self.worksheet.as_deref().unwrap_or(&self.name)
    }
}
