//! Backfilter and master rebuild against an in-memory warehouse

mod common;

use common::{backend, count, rankings_batch, registry, rows};
use reporting_etl::database::DatabaseBackend;
use reporting_etl::engine::backfilter::{
    StatementKind, build_backfilter_statements, resolve_lookup, run_backfilter, table_backfilter,
};
use reporting_etl::engine::ingest::{IngestScope, ingest_rolling};
use reporting_etl::engine::master::rebuild_master;
use reporting_etl::engine::provision::provision_all;
use reporting_etl::registry::{RegistryOptions, SchemaRegistry};

async fn seed_lookup(backend: &dyn DatabaseBackend) {
    backend
        .execute(
            "INSERT INTO main.lookup_urltolocation (url, property, exact) VALUES \
             ('/contact', 'SiteA', 1), \
             ('contact', 'SiteB', 0), \
             ('', 'Everything', 0), \
             ('austin', 'Austin Office', 0)",
        )
        .await
        .unwrap();
}

async fn property_of(backend: &dyn DatabaseBackend, url: &str) -> Option<String> {
    let rows = rows(
        backend,
        &format!(
            "SELECT property FROM main.moz_pro_rankings WHERE url = '{}'",
            url
        ),
    )
    .await;
    rows[0]["property"].as_str().map(str::to_string)
}

#[tokio::test]
async fn test_exact_match_wins_over_fuzzy() {
    let backend = backend();
    let registry = registry();
    provision_all(&backend, &registry).await.unwrap();
    seed_lookup(&backend).await;

    let table = registry.require_table("moz_pro_rankings").unwrap();
    ingest_rolling(
        &backend,
        &rankings_batch(&[
            ("2024-03-01", "/contact"),
            ("2024-03-01", "/contact-us/form"),
            ("2024-03-01", "/locations/austin"),
            ("2024-03-01", "/about"),
        ]),
        table,
        None,
        &IngestScope::Table,
    )
    .await
    .unwrap();

    let report = table_backfilter(&backend, &registry, table).await.unwrap();
    assert_eq!(report.statements, 3);

    assert_eq!(property_of(&backend, "/contact").await.as_deref(), Some("SiteA"));
    assert_eq!(
        property_of(&backend, "/contact-us/form").await.as_deref(),
        Some("SiteB")
    );
    assert_eq!(
        property_of(&backend, "/locations/austin").await.as_deref(),
        Some("Austin Office")
    );
    assert_eq!(
        property_of(&backend, "/about").await.as_deref(),
        Some("Non-Location Pages")
    );
}

#[tokio::test]
async fn test_no_null_entities_after_backfilter() {
    let backend = backend();
    let registry = registry();
    provision_all(&backend, &registry).await.unwrap();
    seed_lookup(&backend).await;

    backend
        .execute(
            "INSERT INTO main.moz_pro_rankings (report_date, url, property) VALUES \
             ('2024-03-01', '/blog', NULL), \
             ('2024-03-02', NULL, NULL)",
        )
        .await
        .unwrap();

    let table = registry.require_table("moz_pro_rankings").unwrap();
    table_backfilter(&backend, &registry, table).await.unwrap();

    assert_eq!(
        count(&backend, "main.moz_pro_rankings WHERE property IS NULL").await,
        0
    );
}

#[tokio::test]
async fn test_backfilter_is_idempotent() {
    let backend = backend();
    let registry = registry();
    provision_all(&backend, &registry).await.unwrap();
    seed_lookup(&backend).await;

    let table = registry.require_table("moz_pro_rankings").unwrap();
    ingest_rolling(
        &backend,
        &rankings_batch(&[("2024-03-01", "/contact"), ("2024-03-02", "/contact/team")]),
        table,
        None,
        &IngestScope::Table,
    )
    .await
    .unwrap();

    table_backfilter(&backend, &registry, table).await.unwrap();
    let first = rows(
        &backend,
        "SELECT url, property FROM main.moz_pro_rankings ORDER BY url",
    )
    .await;
    table_backfilter(&backend, &registry, table).await.unwrap();
    let second = rows(
        &backend,
        "SELECT url, property FROM main.moz_pro_rankings ORDER BY url",
    )
    .await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_corrected_fuzzy_lookup_reaches_resolved_rows() {
    let backend = backend();
    let registry = registry();
    provision_all(&backend, &registry).await.unwrap();
    backend
        .execute(
            "INSERT INTO main.lookup_urltolocation (url, property, exact) VALUES \
             ('/contact', 'SiteA', 1), ('austin', 'Wrong Office', 0)",
        )
        .await
        .unwrap();

    let table = registry.require_table("moz_pro_rankings").unwrap();
    ingest_rolling(
        &backend,
        &rankings_batch(&[("2024-03-01", "/locations/austin"), ("2024-03-01", "/contact")]),
        table,
        None,
        &IngestScope::Table,
    )
    .await
    .unwrap();
    table_backfilter(&backend, &registry, table).await.unwrap();
    assert_eq!(
        property_of(&backend, "/locations/austin").await.as_deref(),
        Some("Wrong Office")
    );

    // Workbook correction lands through a refresh
    backend
        .execute_transaction(&[
            "DELETE FROM main.lookup_urltolocation WHERE url = 'austin'".to_string(),
            "INSERT INTO main.lookup_urltolocation (url, property, exact) VALUES \
             ('austin', 'Austin Office', 0), ('contact', 'SiteB', 0)"
                .to_string(),
        ])
        .await
        .unwrap();
    table_backfilter(&backend, &registry, table).await.unwrap();

    assert_eq!(
        property_of(&backend, "/locations/austin").await.as_deref(),
        Some("Austin Office")
    );
    assert_eq!(property_of(&backend, "/contact").await.as_deref(), Some("SiteA"));
}

#[tokio::test]
async fn test_failed_statement_aborts_the_rest() {
    let backend = backend();
    let registry = registry();
    provision_all(&backend, &registry).await.unwrap();
    backend
        .execute("DROP TABLE main.lookup_urltolocation")
        .await
        .unwrap();
    backend
        .execute("INSERT INTO main.moz_pro_rankings (report_date, url, property) VALUES ('2024-03-01', '/x', NULL)")
        .await
        .unwrap();

    let table = registry.require_table("moz_pro_rankings").unwrap();
    let lookup = resolve_lookup(&registry, table).unwrap();
    let statements = build_backfilter_statements(table, lookup).unwrap();
    assert_eq!(statements.last().map(|s| s.kind), Some(StatementKind::Default));

    assert!(run_backfilter(&backend, &statements).await.is_err());
    assert_eq!(
        count(&backend, "main.moz_pro_rankings WHERE property IS NULL").await,
        1
    );
}

#[test]
fn test_lookup_resolution_requires_exactly_one() {
    let yaml = r#"
default_schema: main
tables:
  - name: lookup_a
    type: lookup
    tablespace: [moz_pro]
    update_types: [exact]
    columns:
      - {name: url, type: varchar, length: 100, backfilter: true}
      - {name: property, type: varchar, length: 100, entity_col: true}
      - {name: exact, type: bigint, flag: true}
  - name: lookup_b
    type: lookup
    tablespace: [moz_pro]
    update_types: [exact]
    columns:
      - {name: url, type: varchar, length: 100, backfilter: true}
      - {name: property, type: varchar, length: 100, entity_col: true}
      - {name: exact, type: bigint, flag: true}
  - name: moz_pro_rankings
    type: source
    tablespace: [moz_pro]
    columns:
      - {name: url, type: varchar, length: 100, backfilter: true}
      - {name: property, type: varchar, length: 100, entity_col: true}
  - name: orphan
    type: source
    tablespace: [nothing]
    columns:
      - {name: url, type: varchar, length: 100, backfilter: true}
      - {name: property, type: varchar, length: 100, entity_col: true}
"#;
    let registry = SchemaRegistry::from_yaml(yaml, RegistryOptions::default()).unwrap();

    let target = registry.require_table("moz_pro_rankings").unwrap();
    assert!(resolve_lookup(&registry, target).unwrap_err().is_configuration());

    let orphan = registry.require_table("orphan").unwrap();
    assert!(resolve_lookup(&registry, orphan).unwrap_err().is_configuration());
}

#[tokio::test]
async fn test_master_rebuild_unions_reporting_tables() {
    let backend = backend();
    let registry = registry();
    provision_all(&backend, &registry).await.unwrap();

    let rankings = registry.require_table("moz_pro_rankings").unwrap();
    ingest_rolling(
        &backend,
        &rankings_batch(&[("2024-03-01", "/contact"), ("2024-03-02", "/about")]),
        rankings,
        None,
        &IngestScope::Table,
    )
    .await
    .unwrap();
    backend
        .execute(
            "INSERT INTO main.ga_sessions (report_date, data_source, sessions) \
             VALUES ('2024-03-01', 'ga', 42)",
        )
        .await
        .unwrap();

    assert_eq!(rebuild_master(&backend, &registry).await.unwrap(), 3);
    assert_eq!(rebuild_master(&backend, &registry).await.unwrap(), 3);

    assert_eq!(count(&backend, "main.master").await, 3);
    assert_eq!(
        count(&backend, "main.master WHERE sessions IS NULL AND url IS NOT NULL").await,
        2
    );
    assert_eq!(
        count(&backend, "main.master WHERE sessions = 42 AND url IS NULL").await,
        1
    );
}
