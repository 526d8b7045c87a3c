//! Refresh marker inherited from a parent process
//!
//! Kept in its own test binary: the marker is process-wide environment state.

mod common;

use common::{backend, count, day, registry};
use reporting_etl::database::DatabaseBackend;
use reporting_etl::database::config::RefreshSection;
use reporting_etl::engine::provision::provision_all;
use reporting_etl::engine::refresh::{REFRESHED_ENV, RefreshEngine, RefreshLatch};
use reporting_etl::sources::DirectoryWorkbookSource;
use tempfile::tempdir;

#[tokio::test]
async fn test_inherited_marker_skips_due_refresh() {
    let backend = backend();
    let registry = registry();
    provision_all(&backend, &registry).await.unwrap();
    backend
        .execute("INSERT INTO main.lookup_urltolocation (url, property, exact) VALUES ('/kept', 'Kept', 1)")
        .await
        .unwrap();

    let dir = tempdir().unwrap();
    let sheets = dir.path().join("configuration");
    std::fs::create_dir_all(&sheets).unwrap();
    std::fs::write(
        sheets.join("url_to_location.json"),
        r#"[{"URL": "/contact", "Property": "SiteA", "Exact": 1}]"#,
    )
    .unwrap();
    let workbook = DirectoryWorkbookSource::new(dir.path());
    let settings = RefreshSection::default();

    // SAFETY: the only test in this binary, nothing else reads the environment concurrently
    unsafe { std::env::set_var(REFRESHED_ENV, "1") };

    let process = RefreshLatch::process();
    assert!(process.is_set());
    let report = RefreshEngine::new(&backend, &workbook, &settings, &process)
        .refresh_if_due(&registry, day(15))
        .await
        .unwrap();
    assert!(report.due);
    assert!(report.tables.is_empty());
    assert_eq!(
        count(&backend, "main.lookup_urltolocation WHERE url = '/kept'").await,
        1
    );

    // An isolated latch does not inherit the marker
    let isolated = RefreshLatch::new();
    assert!(!isolated.is_set());
    let report = RefreshEngine::new(&backend, &workbook, &settings, &isolated)
        .refresh_if_due(&registry, day(15))
        .await
        .unwrap();
    assert_eq!(report.count(), 1);
    assert_eq!(count(&backend, "main.lookup_urltolocation").await, 1);
    assert_eq!(
        count(&backend, "main.lookup_urltolocation WHERE url = '/contact'").await,
        1
    );

    unsafe { std::env::remove_var(REFRESHED_ENV) };
}
