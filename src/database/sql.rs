//! Identifier and literal rendering
//!
//! Statements are built as text and executed through
//! [`DatabaseBackend`](super::DatabaseBackend). Every identifier and value
//! embedded in generated SQL passes through this module.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::models::{ColumnSpec, ColumnType, TableSpec, parse_date, parse_timestamp};

static PLAIN_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("Invalid regex"));

/// Quote an identifier when it is not a plain lowercase name
pub fn quote_ident(name: &str) -> String {
    if PLAIN_IDENT.is_match(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Quote a string literal
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Schema-qualified, quoted table name
pub fn qualified_table(table: &TableSpec) -> String {
    if table.schema.is_empty() {
        quote_ident(&table.name)
    } else {
        format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name))
    }
}

/// SQL type of a column in the given dialect
pub fn column_type_sql(column: &ColumnSpec, dialect: super::Dialect) -> String {
    match column.column_type {
        ColumnType::Varchar => match column.length {
            Some(length) => format!("VARCHAR({})", length),
            None => "VARCHAR".to_string(),
        },
        ColumnType::Bigint => "BIGINT".to_string(),
        ColumnType::Double => dialect.double_type().to_string(),
        ColumnType::Date => "DATE".to_string(),
        ColumnType::Timestamp => "TIMESTAMP".to_string(),
        ColumnType::Timestamptz => "TIMESTAMPTZ".to_string(),
    }
}

/// Render a date literal, e.g. `DATE '2024-01-31'`
pub fn date_literal(date: chrono::NaiveDate) -> String {
    format!("DATE '{}'", date.format("%Y-%m-%d"))
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a cell as a SQL literal for `column`
///
/// NULL renders as `NULL`. Numbers are emitted bare for numeric columns and
/// quoted otherwise; booleans render as 1/0 for bigint columns. Dates and
/// timestamps are normalised before quoting so the warehouse casts them
/// implicitly; unparseable values fall back to the quoted text.
pub fn render_literal(value: &Value, column: &ColumnSpec) -> String {
    match (value, column.column_type) {
        (Value::Null, _) => "NULL".to_string(),
        (Value::Bool(b), ColumnType::Bigint | ColumnType::Double) => {
            if *b { "1".to_string() } else { "0".to_string() }
        }
        (Value::Number(n), ColumnType::Bigint | ColumnType::Double) => n.to_string(),
        (Value::String(s), ColumnType::Bigint | ColumnType::Double)
            if s.trim().parse::<f64>().is_ok_and(f64::is_finite) =>
        {
            s.trim().to_string()
        }
        (Value::String(s), ColumnType::Bigint | ColumnType::Double) if s.trim().is_empty() => {
            "NULL".to_string()
        }
        (_, ColumnType::Date) => match parse_date(value) {
            Some(date) => quote_literal(&date.format("%Y-%m-%d").to_string()),
            None => quote_literal(&text_of(value)),
        },
        (_, ColumnType::Timestamp | ColumnType::Timestamptz) => match parse_timestamp(value) {
            Some(ts) => quote_literal(&ts.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => quote_literal(&text_of(value)),
        },
        (other, _) => quote_literal(&text_of(other)),
    }
}

/// Render a value without a column spec (used for defaults and scope predicates)
pub fn render_untyped(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => {
            if *b { "1".to_string() } else { "0".to_string() }
        }
        Value::Number(n) => n.to_string(),
        other => quote_literal(&text_of(other)),
    }
}
