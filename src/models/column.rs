//! Column specification for warehouse tables

use serde::{Deserialize, Serialize};

/// Warehouse column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Variable-length string; requires `length`
    Varchar,
    /// 64-bit integer
    Bigint,
    /// Double-precision float
    Double,
    /// Calendar date
    Date,
    /// Timestamp without time zone
    Timestamp,
    /// Timestamp with time zone
    Timestamptz,
}

impl ColumnType {
    /// Whether values of this type are rendered as numbers
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Bigint | ColumnType::Double)
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Varchar => write!(f, "varchar"),
            ColumnType::Bigint => write!(f, "bigint"),
            ColumnType::Double => write!(f, "double"),
            ColumnType::Date => write!(f, "date"),
            ColumnType::Timestamp => write!(f, "timestamp"),
            ColumnType::Timestamptz => write!(f, "timestamptz"),
        }
    }
}

/// Column specification
///
/// Columns are declared statically per client in the schema registry. The
/// flags drive the backfilter (`backfilter`, `entity_col`), master table
/// derivation (`master_include`) and the rolling ingest window (`ingest_indicator`).
///
/// # Example
///
/// ```rust
/// use reporting_etl::models::{ColumnSpec, ColumnType};
///
/// let url = ColumnSpec::varchar("url", 500).with_backfilter();
/// assert_eq!(url.column_type, ColumnType::Varchar);
/// assert!(url.backfilter);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,
    /// Column type
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Maximum length (varchar only, required there)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    /// Default value, used in DDL and as the backfilter fallback for entity columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Join key against the lookup table
    #[serde(default)]
    pub backfilter: bool,
    /// Value supplied by a successful lookup join
    #[serde(default)]
    pub entity_col: bool,
    /// Folded into the master table's column set
    #[serde(default)]
    pub master_include: bool,
    /// Date column that keys the rolling ingest window
    #[serde(default)]
    pub ingest_indicator: bool,
    /// 0/1 flag column; any other value coerces to NULL
    #[serde(default)]
    pub flag: bool,
}

impl ColumnSpec {
    /// Create a column with the given name and type and no flags
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            length: None,
            default: None,
            backfilter: false,
            entity_col: false,
            master_include: false,
            ingest_indicator: false,
            flag: false,
        }
    }

    /// Create a varchar column with a length
    pub fn varchar(name: impl Into<String>, length: u32) -> Self {
        let mut column = Self::new(name, ColumnType::Varchar);
        column.length = Some(length);
        column
    }

    pub fn with_backfilter(mut self) -> Self {
        self.backfilter = true;
        self
    }

    pub fn with_entity(mut self) -> Self {
        self.entity_col = true;
        self
    }

    pub fn with_master(mut self) -> Self {
        self.master_include = true;
        self
    }

    pub fn with_ingest_indicator(mut self) -> Self {
        self.ingest_indicator = true;
        self
    }

    pub fn with_flag(mut self) -> Self {
        self.flag = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Default value as a string, when the default is a string or number
    pub fn default_text(&self) -> Option<String> {
        match self.default.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
