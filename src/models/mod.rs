//! Models module
//!
//! Declarative table, column and index specifications plus the batch type
//! that carries pulled rows through the pipeline.

pub mod batch;
pub mod column;
pub mod index;
pub mod table;
pub mod value;

pub use batch::{Batch, normalize_column_name};
pub use column::{ColumnSpec, ColumnType};
pub use index::{IndexColumn, IndexSpec, SortOrder};
pub use table::{TableSpec, TableType, UpdateType};
pub use value::{coerce_value, parse_date, parse_timestamp};
