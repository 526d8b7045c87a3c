//! Full data source runs through the customizer

mod common;

use std::path::Path;

use common::{backend, count, day, registry, rows};
use reporting_etl::customizer::{RunSteps, SetupOptions, setup_with};
use reporting_etl::database::DatabaseBackend;
use reporting_etl::database::config::DataSourceSection;
use reporting_etl::engine::ingest::IngestOutcome;
use reporting_etl::engine::refresh::RefreshLatch;
use reporting_etl::pipeline::Stage;
use reporting_etl::sources::JsonFileSource;
use reporting_etl::{Customizer, EtlConfig};
use tempfile::tempdir;

fn config(base_dir: &Path) -> EtlConfig {
    let mut moz_pro = DataSourceSection::new("moz_pro_rankings");
    moz_pro.rolling_days = 5;
    moz_pro.scope_column = Some("data_source".to_string());
    moz_pro
        .rename
        .insert("Page URL".to_string(), "url".to_string());

    let mut config = EtlConfig::new();
    config.base_dir = base_dir.to_path_buf();
    config.data_sources.insert("moz_pro".to_string(), moz_pro);
    config
}

async fn customizer(config: &EtlConfig, expedited: bool) -> Customizer {
    setup_with(
        config,
        "moz_pro",
        registry(),
        Box::new(backend()),
        SetupOptions::new(day(10))
            .expedited(expedited)
            .with_latch(RefreshLatch::new()),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_run_ingests_and_backfilters() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("moz_pro.json");
    std::fs::write(
        &input,
        r#"[
            {"report_date": "03/05/2024", "Page URL": "/contact", "Keyword": "dentist", "Search Position": "4", "Extra": "x"},
            {"report_date": "2024-03-06", "Page URL": "/about", "Keyword": "dentist", "Search Position": 9},
            {"report_date": "2024-02-01", "Page URL": "/old", "Keyword": "dentist", "Search Position": 1}
        ]"#,
    )
    .unwrap();

    let config = config(dir.path());
    let customizer = customizer(&config, false).await;
    let provisioned = customizer.provision_report().unwrap();
    assert_eq!(provisioned.created.len(), 4);
    assert!(!customizer.refresh_report().unwrap().due);

    customizer
        .backend()
        .execute("INSERT INTO main.lookup_urltolocation (url, property, exact) VALUES ('/contact', 'SiteA', 1)")
        .await
        .unwrap();

    let source = JsonFileSource::new(&input).with_date_field("report_date");
    let report = customizer
        .run(&source, day(10), RunSteps::default())
        .await
        .unwrap();

    assert_eq!(report.start, Some(day(5)));
    assert_eq!(report.end, Some(day(9)));
    assert_eq!(report.pulled, Some(2));
    assert!(matches!(
        report.ingest,
        Some(IngestOutcome::Loaded { rows_inserted: 2, .. })
    ));
    assert_eq!(report.backfilter.as_ref().map(|b| b.statements), Some(3));
    assert!(report.post_processed);

    let loaded = rows(
        customizer.backend(),
        "SELECT report_date, data_source, url, search_position, property \
         FROM main.moz_pro_rankings ORDER BY report_date",
    )
    .await;
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0]["data_source"], "moz_pro");
    assert_eq!(loaded[0]["url"], "/contact");
    assert_eq!(loaded[0]["search_position"], 4);
    assert_eq!(loaded[0]["property"], "SiteA");
    assert_eq!(loaded[1]["url"], "/about");
    assert_eq!(loaded[1]["property"], "Non-Location Pages");
}

#[tokio::test]
async fn test_processing_stages_shape_the_batch() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let customizer = customizer(&config, true).await;
    assert!(customizer.provision_report().is_none());

    let batch = reporting_etl::Batch::from_records(&[
        serde_json::json!({"Report Date": "03/05/2024", "Page URL": "/contact", "Search Position": "4", "Extra": "x"}),
        serde_json::json!({"Report Date": "", "Page URL": "/nowhere", "Search Position": "1", "Extra": "y"}),
    ])
    .unwrap();

    let processed = customizer.run_processing(batch).await.unwrap();
    assert_eq!(processed.len(), 1);
    assert!(processed.column_index("extra").is_none());
    assert_eq!(
        processed.get(0, "report_date"),
        Some(&serde_json::json!("2024-03-05"))
    );
    assert_eq!(processed.get(0, "url"), Some(&serde_json::json!("/contact")));
    assert_eq!(
        processed.get(0, "search_position"),
        Some(&serde_json::json!(4))
    );
    assert_eq!(
        processed.get(0, "data_source"),
        Some(&serde_json::json!("moz_pro"))
    );
}

#[tokio::test]
async fn test_empty_pull_ends_the_run() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("empty.json");
    std::fs::write(&input, "[]").unwrap();

    let config = config(dir.path());
    let customizer = customizer(&config, false).await;
    let report = customizer
        .run(&JsonFileSource::new(&input), day(10), RunSteps::default())
        .await
        .unwrap();

    assert_eq!(report.pulled, Some(0));
    assert!(report.ingest.is_none());
    assert!(report.backfilter.is_none());
    assert!(!report.post_processed);
}

#[tokio::test]
async fn test_post_processing_scripts_run_in_order() {
    let dir = tempdir().unwrap();
    let sql = dir.path().join("sql");
    std::fs::create_dir_all(&sql).unwrap();
    std::fs::write(
        sql.join("2_moz_pro_create.sql"),
        "CREATE TABLE main.audit (step INTEGER);",
    )
    .unwrap();
    std::fs::write(
        sql.join("10_moz_pro_insert.sql"),
        "INSERT INTO main.audit VALUES (10); INSERT INTO main.audit VALUES (11);",
    )
    .unwrap();
    std::fs::write(sql.join("1_ga_drop.sql"), "DROP TABLE main.audit;").unwrap();

    let config = config(dir.path());
    let customizer = customizer(&config, true).await;

    assert!(!customizer.run_post_processing(&[Stage::Parse]).await.unwrap());
    assert!(
        customizer
            .run_post_processing(&[Stage::PostProcessing])
            .await
            .unwrap()
    );
    assert_eq!(count(customizer.backend(), "main.audit").await, 2);
}

#[tokio::test]
async fn test_failing_script_stops_later_scripts() {
    let dir = tempdir().unwrap();
    let sql = dir.path().join("sql");
    std::fs::create_dir_all(&sql).unwrap();
    std::fs::write(sql.join("1_moz_pro_create.sql"), "CREATE TABLE main.audit (step INTEGER);").unwrap();
    std::fs::write(sql.join("2_moz_pro_broken.sql"), "INSERT INTO main.missing VALUES (1);").unwrap();
    std::fs::write(sql.join("3_moz_pro_insert.sql"), "INSERT INTO main.audit VALUES (3);").unwrap();

    let config = config(dir.path());
    let customizer = customizer(&config, true).await;

    assert!(
        customizer
            .run_post_processing(&[Stage::PostProcessing])
            .await
            .is_err()
    );
    assert_eq!(count(customizer.backend(), "main.audit").await, 0);
}

#[tokio::test]
async fn test_unknown_data_source_is_configuration_error() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());

    let err = setup_with(
        &config,
        "bing_ads",
        registry(),
        Box::new(backend()),
        SetupOptions::new(day(10)).with_latch(RefreshLatch::new()),
    )
    .await
    .unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("bing_ads"));
}

#[tokio::test]
async fn test_unknown_table_is_configuration_error() {
    let dir = tempdir().unwrap();
    let mut config = config(dir.path());
    config
        .data_sources
        .insert("gmb".to_string(), DataSourceSection::new("gmb_insights"));

    let err = setup_with(
        &config,
        "gmb",
        registry(),
        Box::new(backend()),
        SetupOptions::new(day(10)).with_latch(RefreshLatch::new()),
    )
    .await
    .unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_date_window() {
    let dir = tempdir().unwrap();
    let mut config = config(dir.path());
    let rolling = customizer(&config, true).await;
    assert_eq!(rolling.date_window(day(10)).unwrap(), (day(5), day(9)));

    let moz_pro = config.data_sources.get_mut("moz_pro").unwrap();
    moz_pro.historical = true;
    let no_start = customizer(&config, true).await;
    assert!(no_start.date_window(day(10)).unwrap_err().is_configuration());

    let moz_pro = config.data_sources.get_mut("moz_pro").unwrap();
    moz_pro.historical_start_date = Some(day(1));
    let historical = customizer(&config, true).await;
    assert_eq!(historical.date_window(day(10)).unwrap(), (day(1), day(9)));
    assert!(historical.date_window(day(1)).is_err());
}
