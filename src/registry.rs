//! Schema registry
//!
//! The registry is the per-client set of table specifications, loaded once
//! from a YAML document, validated, and then shared read-only by every
//! engine. The master table's column list is derived here from the active
//! reporting tables.
//!
//! ```yaml
//! default_schema: public
//! tables:
//!   - name: moz_pro_rankings
//!     type: reporting
//!     tablespace: [moz_pro]
//!     columns: [...]
//!     indexes: [...]
//! master:
//!   name: master
//!   indexes: [...]
//! custom_columns:
//!   - name: region
//!     type: varchar
//!     length: 50
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EtlError, EtlResult};
use crate::models::{ColumnSpec, IndexSpec, TableSpec, TableType};
use crate::validation::TableValidator;

fn default_schema() -> String {
    "public".to_string()
}

fn default_master_name() -> String {
    "master".to_string()
}

/// Master table section of the registry document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterDocument {
    #[serde(default = "default_master_name")]
    pub name: String,
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub tablespace: Vec<String>,
    /// Columns placed ahead of the derived ones
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Registry document as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default = "default_schema")]
    pub default_schema: String,
    #[serde(default)]
    pub tables: Vec<TableSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master: Option<MasterDocument>,
    /// Client-specific columns appended to the master table when enabled
    #[serde(default)]
    pub custom_columns: Vec<ColumnSpec>,
}

/// Options applied while building the registry
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryOptions {
    /// Append `custom_columns` to the master table
    pub custom_columns_enabled: bool,
}

/// Append `candidates` to `columns`, skipping names already present
///
/// The first column with a given name wins; a later column of the same name
/// is ignored even when its type differs.
fn append_unique<'a>(columns: &mut Vec<ColumnSpec>, candidates: impl Iterator<Item = &'a ColumnSpec>) {
    for candidate in candidates {
        if columns.iter().any(|c| c.name == candidate.name) {
            tracing::debug!(column = %candidate.name, "Skipping duplicate master column");
            continue;
        }
        columns.push(candidate.clone());
    }
}

/// Derive the master table's columns
///
/// Starts from `base`, then walks the active reporting tables in declared
/// order appending every `master_include` column, then appends the custom
/// columns one by one.
pub fn derive_master_columns(
    base: &[ColumnSpec],
    tables: &[TableSpec],
    custom_columns: &[ColumnSpec],
) -> Vec<ColumnSpec> {
    let mut columns = base.to_vec();
    for table in tables
        .iter()
        .filter(|t| t.active && t.table_type == TableType::Reporting)
    {
        append_unique(&mut columns, table.columns.iter().filter(|c| c.master_include));
    }
    append_unique(&mut columns, custom_columns.iter());
    columns
}

/// Validated, immutable set of table specifications
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    default_schema: String,
    tables: Vec<TableSpec>,
    master: Option<TableSpec>,
}

impl SchemaRegistry {
    /// Load and build a registry from a YAML file
    pub fn load(path: &Path, options: RegistryOptions) -> EtlResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EtlError::Configuration(format!(
                "Failed to read schema registry {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content, options)
    }

    /// Parse and build a registry from YAML text
    pub fn from_yaml(content: &str, options: RegistryOptions) -> EtlResult<Self> {
        let document: RegistryDocument = serde_yaml::from_str(content).map_err(|e| {
            EtlError::Configuration(format!("Failed to parse schema registry: {}", e))
        })?;
        Self::build(document, options)
    }

    /// Build a registry from a parsed document
    ///
    /// Fills empty schemas with the default schema, derives the master table
    /// and validates every table. Any violation is a configuration error.
    pub fn build(document: RegistryDocument, options: RegistryOptions) -> EtlResult<Self> {
        let default_schema = document.default_schema;

        let tables: Vec<TableSpec> = document
            .tables
            .into_iter()
            .map(|mut table| {
                if table.schema.is_empty() {
                    table.schema = default_schema.clone();
                }
                table
            })
            .collect();

        if tables.iter().any(|t| t.table_type == TableType::Master) {
            return Err(EtlError::config(
                "Master tables are derived; declare them under 'master', not 'tables'",
            ));
        }

        let custom_columns: &[ColumnSpec] = if options.custom_columns_enabled {
            &document.custom_columns
        } else {
            &[]
        };

        let master = document.master.map(|m| {
            let columns = derive_master_columns(&m.columns, &tables, custom_columns);
            let mut master = TableSpec::new(m.name, TableType::Master, columns);
            master.schema = if m.schema.is_empty() {
                default_schema.clone()
            } else {
                m.schema
            };
            master.tablespace = m.tablespace;
            master.indexes = m.indexes;
            master.owner = m.owner;
            master
        });

        TableValidator::new()
            .validate_tables(tables.iter().chain(master.iter()))
            .into_result()?;

        tracing::debug!(
            tables = tables.len(),
            master = master.is_some(),
            "Schema registry built"
        );

        Ok(Self {
            default_schema,
            tables,
            master,
        })
    }

    pub fn default_schema(&self) -> &str {
        &self.default_schema
    }

    /// Every declared table except the master table, in declared order
    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    /// The derived master table, if one is declared
    pub fn master(&self) -> Option<&TableSpec> {
        self.master.as_ref()
    }

    /// Active tables in declared order
    pub fn active_tables(&self) -> impl Iterator<Item = &TableSpec> {
        self.tables.iter().filter(|t| t.active)
    }

    /// Active lookup and source tables, the ones refreshed from the workbook
    pub fn dimension_tables(&self) -> impl Iterator<Item = &TableSpec> {
        self.active_tables().filter(|t| t.table_type.is_dimension())
    }

    /// Active reporting tables in declared order
    pub fn reporting_tables(&self) -> impl Iterator<Item = &TableSpec> {
        self.active_tables()
            .filter(|t| t.table_type == TableType::Reporting)
    }

    /// Active lookup tables sharing a tablespace tag with `table`
    pub fn lookups_for<'a>(&'a self, table: &'a TableSpec) -> Vec<&'a TableSpec> {
        self.active_tables()
            .filter(|t| t.table_type == TableType::Lookup && t.shares_tablespace(table))
            .collect()
    }

    /// Tables matching `name`, including the master table
    ///
    /// `schema.name` matches one table exactly; a bare name matches the table
    /// of that name in every schema.
    fn matching_tables<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a TableSpec> + use<'a, 'n> {
        let qualified = name.split_once('.');
        self.tables
            .iter()
            .chain(self.master.iter())
            .filter(move |t| match qualified {
                Some((schema, table)) => t.schema == schema && t.name == table,
                None => t.name == name,
            })
    }

    /// Table by qualified or bare name
    ///
    /// `None` when no table matches, or when a bare name exists in more than
    /// one schema.
    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        let mut matches = self.matching_tables(name);
        let first = matches.next()?;
        matches.next().is_none().then_some(first)
    }

    /// Table by qualified or bare name; an unknown or ambiguous name is a
    /// configuration error
    pub fn require_table(&self, name: &str) -> EtlResult<&TableSpec> {
        let found: Vec<&TableSpec> = self.matching_tables(name).collect();
        match found.as_slice() {
            [table] => Ok(*table),
            [] => Err(EtlError::Configuration(format!("Unknown table '{}'", name))),
            many => Err(EtlError::Configuration(format!(
                "Table name '{}' is ambiguous, qualify it with one of: {}",
                name,
                many.iter()
                    .map(|t| t.qualified_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}
