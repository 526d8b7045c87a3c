//! Index specification for warehouse tables

use serde::{Deserialize, Serialize};

/// Sort direction of an index column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "ASC"),
            SortOrder::Desc => write!(f, "DESC"),
        }
    }
}

/// One column of an index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexColumn {
    pub name: String,
    #[serde(default)]
    pub sort: SortOrder,
    #[serde(default)]
    pub nulls_last: bool,
}

impl IndexColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sort: SortOrder::Asc,
            nulls_last: false,
        }
    }

    pub fn desc(mut self) -> Self {
        self.sort = SortOrder::Desc;
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls_last = true;
        self
    }
}

fn default_method() -> String {
    "btree".to_string()
}

/// Index specification
///
/// A clustered index triggers a one-time `CLUSTER` right after creation. The
/// physical order is not maintained afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexSpec {
    /// Index name
    pub name: String,
    /// Physical tablespace for the index (PostgreSQL only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tablespace: Option<String>,
    /// Whether the table is clustered on this index
    #[serde(default)]
    pub clustered: bool,
    /// Access method (default: btree)
    #[serde(default = "default_method")]
    pub method: String,
    /// Indexed columns in order
    pub columns: Vec<IndexColumn>,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, columns: Vec<IndexColumn>) -> Self {
        Self {
            name: name.into(),
            tablespace: None,
            clustered: false,
            method: default_method(),
            columns,
        }
    }

    pub fn clustered(mut self) -> Self {
        self.clustered = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_defaults() {
        let yaml = r#"
name: idx_rankings_date
clustered: true
columns:
  - name: report_date
    sort: desc
    nulls_last: true
  - name: url
"#;
        let index: IndexSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(index.method, "btree");
        assert!(index.clustered);
        assert!(index.tablespace.is_none());
        assert_eq!(index.columns[0].sort, SortOrder::Desc);
        assert!(index.columns[0].nulls_last);
        assert_eq!(index.columns[1].sort, SortOrder::Asc);
        assert!(!index.columns[1].nulls_last);
    }
}
