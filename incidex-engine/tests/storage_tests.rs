//! Document persistence: round-trip, missing and corrupt files

mod helpers;

use helpers::{at, observation};
use incidex_common::models::{CacheDocument, RunSource, Severity, Status};
use incidex_engine::services::consolidate_at;
use incidex_engine::storage::{DocumentStore, RunLock};
use incidex_engine::EngineError;
use tempfile::TempDir;

/// Document with two runs and one incident carrying several history events
fn multi_run_document() -> CacheDocument {
    let source = RunSource {
        source_id: "jira".to_string(),
        asset: "/exports/jira.json".to_string(),
        fingerprint: Some("9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08".to_string()),
    };

    let first = vec![observation("jira", "INC-1", Severity::Low, Status::Open)];
    let mut second = observation("jira", "INC-1", Severity::High, Status::Closed);
    second.feature = Some("checkout".to_string());

    let document = consolidate_at(
        CacheDocument::empty(at(1, 0)),
        first,
        vec![source.clone()],
        at(1, 9),
    )
    .unwrap()
    .document;
    consolidate_at(document, vec![second], vec![source], at(3, 14))
        .unwrap()
        .document
}

#[tokio::test]
async fn test_save_then_load_round_trips() {
    let dir = TempDir::new().unwrap();
    let store = DocumentStore::new(dir.path().join("incidents.json"), true);
    let document = multi_run_document();
    assert!(document.incidents.values().any(|r| r.history.len() >= 3));

    store.save(&document, "run").await.unwrap();
    let loaded = store.load().await.unwrap();

    assert_eq!(loaded, document);
}

#[tokio::test]
async fn test_missing_document_loads_empty() {
    let dir = TempDir::new().unwrap();
    let store = DocumentStore::new(dir.path().join("absent.json"), true);

    let document = store.load().await.unwrap();
    assert!(document.runs.is_empty());
    assert!(document.incidents.is_empty());
}

#[tokio::test]
async fn test_corrupt_document_strict_load_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("incidents.json");
    std::fs::write(&path, "{\"generated_at\": 12").unwrap();

    let err = DocumentStore::new(&path, true).load().await.unwrap_err();
    assert!(matches!(err, EngineError::Corrupt { .. }));
    assert_eq!(err.stage(), "read");
    // Strict mode leaves the file where it is
    assert!(path.exists());
}

#[tokio::test]
async fn test_corrupt_document_lenient_load_quarantines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("incidents.json");
    std::fs::write(&path, "not json at all").unwrap();

    let document = DocumentStore::new(&path, false).load().await.unwrap();
    assert!(document.incidents.is_empty());
    assert!(!path.exists());

    let quarantined: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("incidents.json.corrupt-"))
        .collect();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(
        std::fs::read_to_string(dir.path().join(&quarantined[0])).unwrap(),
        "not json at all"
    );
}

#[tokio::test]
async fn test_failed_save_reports_run_id() {
    let dir = TempDir::new().unwrap();
    // A directory where the document should be makes the rename fail
    let path = dir.path().join("incidents.json");
    std::fs::create_dir_all(path.join("occupied")).unwrap();

    let err = DocumentStore::new(&path, false)
        .save(&multi_run_document(), "20260703T140000.000Z-0000")
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Write { .. }));
    assert_eq!(err.run_id(), Some("20260703T140000.000Z-0000"));
}

#[test]
fn test_lock_blocks_second_holder() {
    let dir = TempDir::new().unwrap();
    let document = dir.path().join("incidents.json");

    let held = RunLock::acquire(&document).unwrap();
    let err = RunLock::acquire(&document).unwrap_err();
    assert!(matches!(err, EngineError::Locked(_)));

    drop(held);
    RunLock::acquire(&document).unwrap();
}

#[tokio::test]
async fn test_snapshot_of_corrupt_document_leaves_file_in_place() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("incidents.json");
    std::fs::write(&path, "{\"generated_at\": 1").unwrap();

    let document = DocumentStore::new(&path, false).load_snapshot().await.unwrap();
    assert!(document.incidents.is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"generated_at\": 1");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

    let err = DocumentStore::new(&path, true).load_snapshot().await.unwrap_err();
    assert!(matches!(err, EngineError::Corrupt { .. }));
}

#[tokio::test]
async fn test_snapshot_reads_saved_document() {
    let dir = TempDir::new().unwrap();
    let store = DocumentStore::new(dir.path().join("incidents.json"), false);
    let document = multi_run_document();
    store.save(&document, "run").await.unwrap();

    assert_eq!(store.load_snapshot().await.unwrap(), document);
}
