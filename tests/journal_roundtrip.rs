//! Round-trip properties of the journal codec and importer.

mod common;

use beadwork::model::{Dependency, DependencyType, Priority, Status};
use beadwork::storage::SqliteStorage;
use beadwork::sync::{export_journal, import_journal, METADATA_LAST_IMPORT_HASH};
use beadwork::util::hash::hash_file;
use chrono::Utc;
use common::issue;
use tempfile::TempDir;

#[test]
fn roundtrip_preserves_observable_state() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("issues.jsonl");
    let mut source = SqliteStorage::open_memory().unwrap();

    let mut alpha = issue("", "Alpha");
    alpha.id = String::new();
    alpha.description = Some("multi\nline\ndescription".to_string());
    alpha.priority = Priority::HIGH;
    alpha.assignee = Some("alice".to_string());
    alpha.estimated_minutes = Some(90);
    let mut beta = issue("", "Beta");
    beta.id = String::new();
    beta.status = Status::Closed;
    beta.external_ref = Some("gh-99".to_string());

    source.create_issue(&mut alpha, "bd", "tester").unwrap();
    source.create_issue(&mut beta, "bd", "tester").unwrap();
    source.add_label(&alpha.id, "keeper", "tester").unwrap();
    source
        .add_dependency(
            &Dependency {
                issue_id: beta.id.clone(),
                depends_on_id: alpha.id.clone(),
                dep_type: DependencyType::DiscoveredFrom,
                created_at: Utc::now(),
                created_by: Some("tester".to_string()),
            },
            "tester",
        )
        .unwrap();

    export_journal(&mut source, &path).unwrap();

    let mut target = SqliteStorage::open_memory().unwrap();
    let outcome = import_journal(&mut target, &path).unwrap();
    assert_eq!(outcome.created, 2);

    let imported_alpha = target.get_issue(&alpha.id).unwrap().unwrap();
    assert_eq!(imported_alpha.title, "Alpha");
    assert_eq!(
        imported_alpha.description.as_deref(),
        Some("multi\nline\ndescription")
    );
    assert_eq!(imported_alpha.priority, Priority::HIGH);
    assert_eq!(imported_alpha.assignee.as_deref(), Some("alice"));
    assert_eq!(imported_alpha.estimated_minutes, Some(90));
    assert_eq!(target.get_labels(&alpha.id).unwrap(), vec!["keeper"]);

    let imported_beta = target.get_issue(&beta.id).unwrap().unwrap();
    assert_eq!(imported_beta.status, Status::Closed);
    assert!(imported_beta.closed_at.is_some());
    assert_eq!(imported_beta.external_ref.as_deref(), Some("gh-99"));

    let deps = target.get_dependency_records(&beta.id).unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].depends_on_id, alpha.id);
    assert_eq!(deps[0].dep_type, DependencyType::DiscoveredFrom);
}

#[test]
fn hash_metadata_matches_file_after_flush_and_import() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("issues.jsonl");
    let mut storage = SqliteStorage::open_memory().unwrap();

    let mut item = issue("", "Hash check");
    item.id = String::new();
    storage.create_issue(&mut item, "bd", "tester").unwrap();
    export_journal(&mut storage, &path).unwrap();

    let on_disk = hash_file(&path).unwrap();
    assert_eq!(
        storage
            .get_metadata(METADATA_LAST_IMPORT_HASH)
            .unwrap()
            .as_deref(),
        Some(on_disk.as_str())
    );

    // A fresh store importing the same file records the same hash.
    let mut other = SqliteStorage::open_memory().unwrap();
    import_journal(&mut other, &path).unwrap();
    assert_eq!(
        other
            .get_metadata(METADATA_LAST_IMPORT_HASH)
            .unwrap()
            .as_deref(),
        Some(on_disk.as_str())
    );
}

#[test]
fn second_import_is_a_noop() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("issues.jsonl");
    std::fs::write(
        &path,
        common::journal_lines(&[issue("bd-1", "Once"), issue("bd-2", "Twice")]),
    )
    .unwrap();

    let mut storage = SqliteStorage::open_memory().unwrap();
    let first = import_journal(&mut storage, &path).unwrap();
    assert_eq!(first.created, 2);

    let second = import_journal(&mut storage, &path).unwrap();
    assert!(second.skipped_unchanged);
    assert_eq!(second.imported(), 0);
}

#[test]
fn dirty_ids_reference_existing_issues_after_mutations() {
    let mut storage = SqliteStorage::open_memory().unwrap();

    let mut a = issue("", "A");
    a.id = String::new();
    let mut b = issue("", "B");
    b.id = String::new();
    storage.create_issue(&mut a, "bd", "tester").unwrap();
    storage.create_issue(&mut b, "bd", "tester").unwrap();
    storage.close_issue(&a.id, "done", "tester").unwrap();

    let all = storage.all_ids().unwrap();
    for id in storage.get_dirty_issues().unwrap() {
        assert!(all.contains(&id), "dirty id {id} does not exist");
    }
}
