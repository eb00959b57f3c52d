#![cfg(feature = "inmem-backend")]

use std::sync::Arc;

use chrono::Utc;

use kbase::api::{FileApi, FolderApi};
use kbase::models::{ContentKind, EntityRef, TrashRecord};
use kbase::trash::{Confirmation, Trash};
use kbase::{ApiError, InMemBackend, KbError};

fn trash_for(backend: &InMemBackend) -> Trash {
    Trash::new(Arc::new(backend.clone()), "u1")
}

#[tokio::test]
async fn trash_round_trip_restores_the_entity() {
    let backend = InMemBackend::new();
    backend.seed_file("file1", "minutes.pdf", "root", "u1");
    let mut trash = trash_for(&backend);

    let record = trash.move_to_trash(&EntityRef::file("file1")).await.unwrap();
    assert_eq!(record.content_type, ContentKind::File);
    assert!(backend.list_files("root").await.unwrap().is_empty());
    assert!(matches!(backend.get_file("file1").await, Err(ApiError::NotFound)));
    assert_eq!(trash.len(), 1);
    assert_eq!(trash.record_for(&EntityRef::file("file1")), Some(&record.id));
    assert!(trash.entries()[0].days_left(Utc::now()) >= 29);

    trash.restore(&record.id).await.unwrap();
    assert!(trash.is_empty());
    assert_eq!(backend.list_files("root").await.unwrap().len(), 1);
}

#[tokio::test]
async fn restoring_a_selection_clears_it() {
    let backend = InMemBackend::new();
    for id in ["f1", "f2", "f3", "f4"] {
        backend.seed_folder(id, id, None, "u1");
    }
    let mut trash = trash_for(&backend);
    for id in ["f1", "f2", "f3", "f4"] {
        trash.move_to_trash(&EntityRef::folder(id)).await.unwrap();
    }
    assert_eq!(trash.len(), 4);

    let ids: Vec<String> = trash.entries().iter().take(3).map(|e| e.record.id.clone()).collect();
    for id in &ids {
        assert!(trash.toggle_select(id));
    }
    assert!(!trash.is_all_selected());

    let outcome = trash.restore_selected().await.unwrap();
    assert_eq!(outcome.succeeded.len(), 3);
    assert!(outcome.failed.is_empty());
    assert!(trash.selection().is_empty());
    assert_eq!(trash.len(), 1);
    assert_eq!(backend.list_folders("root").await.unwrap().len(), 3);
}

#[tokio::test]
async fn missing_entity_keeps_a_placeholder_row() {
    let backend = InMemBackend::new();
    let now = Utc::now();
    backend.insert_trash_record(TrashRecord {
        id: "tr-ghost".into(),
        content_type: ContentKind::Folder,
        original_id: "gone".into(),
        created_at: now,
        expires_at: None,
        user_id: "u1".into(),
    });
    let mut trash = trash_for(&backend);
    trash.reload().await.unwrap();

    let entry = trash.entry("tr-ghost").unwrap();
    assert!(entry.content.is_none());
    assert_eq!(entry.display_name(), "Unnamed folder");
}

#[tokio::test]
async fn select_all_toggles_the_full_set() {
    let backend = InMemBackend::new();
    backend.seed_folder("f1", "One", None, "u1");
    backend.seed_folder("f2", "Two", None, "u1");
    let mut trash = trash_for(&backend);
    trash.move_to_trash(&EntityRef::folder("f1")).await.unwrap();
    trash.move_to_trash(&EntityRef::folder("f2")).await.unwrap();

    trash.select_all();
    assert!(trash.is_all_selected());
    trash.select_all();
    assert!(trash.selection().is_empty());
}

#[tokio::test]
async fn purges_require_a_matching_confirmation() {
    let backend = InMemBackend::new();
    backend.seed_folder("f1", "Reports", None, "u1");
    backend.seed_folder("f2", "Drafts", None, "u1");
    let mut trash = trash_for(&backend);
    trash.move_to_trash(&EntityRef::folder("f1")).await.unwrap();

    let stale = trash.confirm_empty().unwrap();
    assert_eq!(stale.message(), "Empty the trash? All 1 item will be deleted permanently.");
    trash.move_to_trash(&EntityRef::folder("f2")).await.unwrap();
    assert!(matches!(trash.empty_trash(&stale).await, Err(KbError::Confirmation(_))));
    assert_eq!(trash.len(), 2);

    // wrong shape: the selection is still cleared
    trash.select_all();
    assert!(matches!(trash.delete_selected(&stale).await, Err(KbError::Confirmation(_))));
    assert!(trash.selection().is_empty());

    let first = trash.entries()[0].record.id.clone();
    let single = trash.confirm_delete(&first).unwrap();
    assert!(matches!(single, Confirmation::Single { .. }));
    trash.permanently_delete(&single).await.unwrap();
    assert_eq!(trash.len(), 1);

    let fresh = trash.confirm_empty().unwrap();
    let outcome = trash.empty_trash(&fresh).await.unwrap();
    assert_eq!(outcome.succeeded.len(), 1);
    assert!(trash.is_empty());
    assert_eq!(backend.trash_len(), 0);
    assert!(backend.get_folder("f1").await.is_err());
    assert!(backend.get_folder("f2").await.is_err());
}

#[tokio::test]
async fn deleting_a_selection_reports_per_record() {
    let backend = InMemBackend::new();
    backend.seed_folder("f1", "One", None, "u1");
    backend.seed_folder("f2", "Two", None, "u1");
    let mut trash = trash_for(&backend);
    trash.move_to_trash(&EntityRef::folder("f1")).await.unwrap();
    trash.move_to_trash(&EntityRef::folder("f2")).await.unwrap();
    trash.select_all();

    let confirmation = trash.confirm_delete_selected().unwrap();
    assert_eq!(confirmation.message(), "Delete 2 selected items permanently? This cannot be undone.");
    let outcome = trash.delete_selected(&confirmation).await.unwrap();
    assert_eq!(outcome.succeeded.len(), 2);
    assert!(trash.is_empty());
    assert!(trash.selection().is_empty());
}
