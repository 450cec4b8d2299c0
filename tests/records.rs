//! File-backed record store behavior: persistence across instances, filtered
//! history reads, and recovery from a missing or damaged backing file.

use delvegraph::records::{JsonFileRecordStore, PersistenceError, RecordStore, RunRecord};

#[tokio::test]
async fn records_survive_a_store_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("records.json");

    let store = JsonFileRecordStore::new(&path);
    let id = store
        .append(
            RunRecord::new("how do tides work?", "Tides follow the moon.")
                .with_effort("high")
                .with_model(Some("scripted-large".into()))
                .with_queries(vec!["tide tables".into(), "lunar gravity".into()])
                .with_source_count(6)
                .with_duration_ms(Some(1200)),
        )
        .await
        .unwrap();
    drop(store);

    let reopened = JsonFileRecordStore::new(&path);
    let record = reopened.get(id).await.unwrap().expect("record persisted");
    assert_eq!(record.query, "how do tides work?");
    assert_eq!(record.effort, "high");
    assert_eq!(record.model.as_deref(), Some("scripted-large"));
    assert_eq!(record.queries.len(), 2);
    assert_eq!(record.source_count, 6);
    assert_eq!(record.duration_ms, Some(1200));
}

#[tokio::test]
async fn recent_reads_newest_first_with_filter_and_limit() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = JsonFileRecordStore::new(temp_dir.path().join("records.json"));

    store
        .append(RunRecord::new("rust async", "tokio is dominant"))
        .await
        .unwrap();
    store
        .append(RunRecord::new("gardening", "soil acidity matters"))
        .await
        .unwrap();
    store
        .append(RunRecord::new("rust errors", "miette renders diagnostics"))
        .await
        .unwrap();

    let newest = store.recent(2, None).await.unwrap();
    assert_eq!(newest.len(), 2);
    assert_eq!(newest[0].query, "rust errors");
    assert_eq!(newest[1].query, "gardening");

    let rust_only = store.recent(10, Some("RUST")).await.unwrap();
    assert_eq!(rust_only.len(), 2);
    assert_eq!(rust_only[0].query, "rust errors");
    assert_eq!(rust_only[1].query, "rust async");
}

#[tokio::test]
async fn remove_and_clear_rewrite_the_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("records.json");
    let store = JsonFileRecordStore::new(&path);

    let keep = store.append(RunRecord::new("keep", "r")).await.unwrap();
    let drop_id = store.append(RunRecord::new("drop", "r")).await.unwrap();

    assert!(store.remove(drop_id).await.unwrap());
    assert!(!store.remove(drop_id).await.unwrap());

    let after_remove = JsonFileRecordStore::new(&path);
    assert!(after_remove.get(keep).await.unwrap().is_some());
    assert!(after_remove.get(drop_id).await.unwrap().is_none());

    assert_eq!(store.clear().await.unwrap(), 1);
    assert_eq!(store.clear().await.unwrap(), 0);
    assert!(store.recent(10, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn a_missing_file_reads_as_empty_history() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = JsonFileRecordStore::new(temp_dir.path().join("never_written.json"));
    assert!(store.recent(10, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn parent_directories_are_created_on_first_write() {
    let temp_dir = tempfile::tempdir().unwrap();
    let nested = temp_dir.path().join("state").join("history").join("records.json");

    let store = JsonFileRecordStore::new(&nested);
    store.append(RunRecord::new("q", "r")).await.unwrap();
    assert!(nested.exists());
}

#[tokio::test]
async fn a_damaged_file_surfaces_an_encode_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("records.json");
    std::fs::write(&path, b"{ not json").unwrap();

    let store = JsonFileRecordStore::new(&path);
    let error = store.recent(10, None).await.unwrap_err();
    assert!(matches!(error, PersistenceError::Encode(_)));
}
