//! Atomicity of the journal rewrite.
//!
//! A flush killed between temp-file creation and rename must leave the
//! prior journal, the recorded hash, and the dirty set intact; the next
//! invocation retries and converges.

use beadwork::model::Issue;
use beadwork::storage::SqliteStorage;
use beadwork::sync::flush::SyncController;
use beadwork::sync::{parse_journal, METADATA_LAST_IMPORT_HASH};
use beadwork::util::hash::hash_file;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn create(store: &Arc<Mutex<SqliteStorage>>, title: &str) -> String {
    let mut issue = Issue {
        title: title.to_string(),
        ..Issue::default()
    };
    store
        .lock()
        .unwrap()
        .create_issue(&mut issue, "bd", "tester")
        .unwrap();
    issue.id
}

#[test]
fn orphaned_temp_file_does_not_disturb_state() {
    let temp = TempDir::new().unwrap();
    let journal = temp.path().join("issues.jsonl");
    let store = Arc::new(Mutex::new(SqliteStorage::open_memory().unwrap()));

    // A prior run established journal and hash.
    let mut controller = SyncController::new(
        Arc::clone(&store),
        journal.clone(),
        Duration::from_millis(40),
        true,
    );
    create(&store, "stable");
    controller.mark_dirty();
    controller.flush_now();

    let journal_before = fs::read(&journal).unwrap();
    let hash_before = store
        .lock()
        .unwrap()
        .get_metadata(METADATA_LAST_IMPORT_HASH)
        .unwrap();
    assert_eq!(hash_before.as_deref(), Some(hash_file(&journal).unwrap().as_str()));

    // Simulate a flush killed after the temp write, before the rename: the
    // orphaned temp file from some other process sits beside the journal.
    let orphan = temp.path().join("issues.jsonl.tmp.99999");
    fs::write(&orphan, b"{\"half\":\"written").unwrap();

    // Nothing about the visible state moved.
    assert_eq!(fs::read(&journal).unwrap(), journal_before);
    assert_eq!(
        store
            .lock()
            .unwrap()
            .get_metadata(METADATA_LAST_IMPORT_HASH)
            .unwrap(),
        hash_before
    );

    // The interrupted mutation is still dirty and the next flush converges.
    let id = create(&store, "retry me");
    controller.mark_dirty();
    controller.flush_now();

    let issues = parse_journal(&fs::read_to_string(&journal).unwrap()).unwrap();
    assert_eq!(issues.len(), 2);
    assert!(issues.iter().any(|i| i.id == id));
    assert!(store.lock().unwrap().get_dirty_issues().unwrap().is_empty());

    controller.shutdown();
    // The orphan is another process's problem; it was never renamed in.
    assert!(orphan.exists());
}

#[test]
fn failed_rename_target_keeps_prior_journal() {
    let temp = TempDir::new().unwrap();
    let journal = temp.path().join("issues.jsonl");
    fs::write(&journal, b"{\"id\":\"bd-1\",\"title\":\"prior\",\"created_at\":\"2026-01-01T00:00:00Z\",\"updated_at\":\"2026-01-01T00:00:00Z\"}\n").unwrap();
    let before = fs::read(&journal).unwrap();

    let store = Arc::new(Mutex::new(SqliteStorage::open_memory().unwrap()));
    // An unserializable state cannot happen with our model, so provoke the
    // failure at the filesystem layer instead: make the journal's parent
    // read-only is platform-dependent, but a directory in place of the
    // temp-file path is not.
    let temp_name = format!("issues.jsonl.tmp.{}", std::process::id());
    fs::create_dir(temp.path().join(&temp_name)).unwrap();

    let mut controller = SyncController::new(
        Arc::clone(&store),
        journal.clone(),
        Duration::from_millis(40),
        true,
    );
    let mut incoming = Issue {
        id: "bd-2".to_string(),
        title: "never lands".to_string(),
        ..Issue::default()
    };
    store
        .lock()
        .unwrap()
        .create_issue(&mut incoming, "bd", "tester")
        .unwrap();
    controller.mark_dirty();
    controller.flush_now();

    assert_eq!(controller.failure_count(), 1);
    assert_eq!(fs::read(&journal).unwrap(), before);
    assert_eq!(store.lock().unwrap().get_dirty_issues().unwrap().len(), 1);
    assert!(store
        .lock()
        .unwrap()
        .get_metadata(METADATA_LAST_IMPORT_HASH)
        .unwrap()
        .is_none());

    // Unblock and retry: converges.
    fs::remove_dir(temp.path().join(&temp_name)).unwrap();
    controller.mark_dirty();
    controller.flush_now();
    assert_eq!(controller.failure_count(), 0);
    let issues = parse_journal(&fs::read_to_string(&journal).unwrap()).unwrap();
    assert_eq!(issues.len(), 2);

    controller.note_manual_export();
    controller.shutdown();
}
