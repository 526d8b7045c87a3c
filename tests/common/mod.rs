//! Shared fixtures for the warehouse integration tests

#![allow(dead_code)]

use chrono::NaiveDate;
use reporting_etl::database::{DatabaseBackend, DuckDBBackend};
use reporting_etl::models::Batch;
use reporting_etl::registry::{RegistryOptions, SchemaRegistry};
use serde_json::{Value, json};

pub const REGISTRY: &str = r#"
default_schema: main
tables:
  - name: lookup_urltolocation
    type: lookup
    tablespace: [moz_pro]
    update_types: [exact, fuzzy]
    worksheet: url_to_location
    columns:
      - {name: url, type: varchar, length: 500, backfilter: true}
      - {name: property, type: varchar, length: 100, entity_col: true}
      - {name: exact, type: bigint, flag: true}
  - name: moz_pro_rankings
    type: reporting
    tablespace: [moz_pro]
    columns:
      - {name: report_date, type: date, ingest_indicator: true, master_include: true}
      - {name: data_source, type: varchar, length: 50, master_include: true}
      - {name: url, type: varchar, length: 500, backfilter: true, master_include: true}
      - {name: keyword, type: varchar, length: 200}
      - {name: search_position, type: bigint}
      - {name: property, type: varchar, length: 100, entity_col: true, default: Non-Location Pages, master_include: true}
    indexes:
      - name: idx_moz_pro_rankings_date
        clustered: true
        columns: [{name: report_date, sort: desc}]
  - name: ga_sessions
    type: reporting
    tablespace: [ga]
    columns:
      - {name: report_date, type: date, ingest_indicator: true, master_include: true}
      - {name: data_source, type: varchar, length: 50, master_include: true}
      - {name: sessions, type: bigint, master_include: true}
    indexes:
      - name: idx_ga_sessions_date
        clustered: true
        columns: [{name: report_date}]
master:
  name: master
  indexes:
    - name: idx_master_date
      clustered: true
      columns: [{name: report_date}]
"#;

pub fn registry() -> SchemaRegistry {
    SchemaRegistry::from_yaml(REGISTRY, RegistryOptions::default()).unwrap()
}

pub fn backend() -> DuckDBBackend {
    DuckDBBackend::in_memory().unwrap()
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

/// `SELECT COUNT(*) AS n ...` as an integer
pub async fn count(backend: &dyn DatabaseBackend, from_where: &str) -> i64 {
    let result = backend
        .execute_query(&format!("SELECT COUNT(*) AS n FROM {}", from_where))
        .await
        .unwrap();
    result.scalar_i64("n").unwrap()
}

/// Rows of a query as JSON objects
pub async fn rows(backend: &dyn DatabaseBackend, sql: &str) -> Vec<Value> {
    backend.execute_query(sql).await.unwrap().rows
}

/// moz_pro batch with one row per `(date, url)`
pub fn rankings_batch(rows: &[(&str, &str)]) -> Batch {
    let records: Vec<Value> = rows
        .iter()
        .map(|(date, url)| {
            json!({
                "report_date": date,
                "data_source": "moz_pro",
                "url": url,
                "keyword": "dentist near me",
                "search_position": 3
            })
        })
        .collect();
    Batch::from_records(&records).unwrap()
}
