#![cfg(feature = "inmem-backend")]

use std::sync::Arc;
use std::time::Duration;

use kbase::api::TrashApi;
use kbase::models::{Content, EntityRef};
use kbase::nav::{build_navigation_path, BreadcrumbItem, NavigationError};
use kbase::route::{QueryState, Route, Section};
use kbase::store::MemoryStore;
use kbase::{ClientConfig, ContentActions, InMemBackend, ViewContent, ViewState, Workspace};

/// root → a → b → c
fn tree() -> InMemBackend {
    let backend = InMemBackend::new();
    backend.seed_folder("a", "Area", None, "u1");
    backend.seed_folder("b", "Budget", Some("a"), "u1");
    backend.seed_folder("c", "Contracts", Some("b"), "u1");
    backend
}

fn path_ids(ws: &Workspace) -> Vec<String> {
    ws.path().crumbs().iter().map(|c| c.id.clone()).collect()
}

fn grid_folders(state: &ViewState) -> Vec<String> {
    match &state.content {
        ViewContent::Listing(l) => l.folders.iter().map(|f| f.id.clone()).collect(),
        other => panic!("unexpected {other:?}"),
    }
}

fn workspace(backend: &InMemBackend) -> Workspace {
    Workspace::new(
        Arc::new(backend.clone()),
        &ClientConfig::default(),
        Arc::new(MemoryStore::new()),
        Some("u1".into()),
    )
}

#[tokio::test]
async fn path_walks_ancestors_without_duplicates() {
    let backend = tree();
    let path = build_navigation_path(&backend, "root", "Inicio", "c").await.unwrap();
    let ids: Vec<&str> = path.crumbs().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["root", "a", "b", "c"]);

    let items = path.breadcrumb();
    assert_eq!(items.len(), 3);
    assert_eq!(items[1], BreadcrumbItem::Ellipsis { target: 2 });
    assert_eq!(items[2], BreadcrumbItem::Current { name: "Contracts".into() });
}

#[tokio::test]
async fn cyclic_hierarchy_is_reported() {
    let backend = InMemBackend::new();
    backend.seed_folder("x", "X", Some("y"), "u1");
    backend.seed_folder("y", "Y", Some("x"), "u1");
    let err = build_navigation_path(&backend, "root", "Inicio", "x").await.unwrap_err();
    assert!(matches!(err, NavigationError::Cycle(_)));

    let ws = workspace(&backend);
    let state = ws.open("/folder/x").await;
    assert_eq!(state.content, ViewContent::Empty);
    assert!(state.panel_error.is_some());
}

#[tokio::test]
async fn deep_link_rebuilds_path_and_lists_children() {
    let backend = tree();
    backend.seed_theme("t1", "Policy", "b", "u1", false);
    backend.seed_theme("t2", "Wip", "b", "u1", true);
    backend.seed_file("file1", "budget.xlsx", "b", "u1");
    let ws = workspace(&backend);

    let state = ws.open("/folder/b").await;
    assert_eq!(state.route, Route::FolderBrowse { folder_id: Some("b".into()) });
    assert_eq!(ws.path().len(), 3);
    match state.content {
        ViewContent::Listing(l) => {
            assert_eq!(l.folders.len(), 1);
            assert_eq!(l.themes.len(), 1);
            assert_eq!(l.drafts.len(), 1);
            assert_eq!(l.files.len(), 1);
        }
        other => panic!("unexpected {other:?}"),
    }

    // breadcrumb jump to the first level truncates
    let state = ws.navigate_to_breadcrumb(1).await.unwrap();
    assert_eq!(state.url, "/folder/a");
    assert_eq!(ws.path().current().id, "a");
}

#[tokio::test]
async fn theme_detail_returns_to_the_folder_it_was_opened_from() {
    let backend = tree();
    backend.seed_theme("t1", "Policy", "c", "u1", false);
    let ws = workspace(&backend);

    ws.open("/folder/c").await;
    let state = ws.navigate_to_theme_detail("t1").await;
    assert_eq!(state.url, "/theme-detail/t1?folderId=c");

    let state = ws.navigate_back_from_theme_detail().await;
    assert_eq!(state.url, "/folder/c");
    assert_eq!(ws.path().len(), 4);
}

#[tokio::test]
async fn back_navigation_falls_back_to_query_then_container() {
    let backend = tree();
    backend.seed_theme("t1", "Policy", "b", "u1", false);
    let ws = workspace(&backend);

    ws.open("/theme-detail/t1?folderId=b").await;
    assert_eq!(ws.navigate_back_from_theme_detail().await.url, "/folder/b");

    ws.open("/theme-detail/t1").await;
    let state = ws.navigate_back_from_theme_detail().await;
    assert_eq!(state.url, "/");
    assert_eq!(ws.path().len(), 1);
}

#[tokio::test]
async fn folder_navigation_keeps_search_state() {
    let backend = tree();
    backend.seed_folder("a2", "Archive", None, "u1");
    let ws = workspace(&backend);
    ws.open("/").await;

    let query = QueryState { q: Some("ar".into()), filters: vec!["folders".into()], sort_by: Some("name".into()) };
    let state = ws.set_query(query.clone()).await;
    match &state.content {
        ViewContent::Listing(l) => {
            let names: Vec<&str> = l.folders.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(names, ["Archive", "Area"]);
        }
        other => panic!("unexpected {other:?}"),
    }

    let state = ws.navigate_to_folder("a", "Area").await;
    assert!(state.url.starts_with("/folder/a?"));
    assert_eq!(ws.current_entry().query, query);

    // sections start from a clean query
    let state = ws.navigate_to_section(Section::Favorites).await;
    assert_eq!(state.url, "/favoritos");
}

#[tokio::test]
async fn unknown_urls_resolve_to_the_container() {
    let ws = workspace(&tree());
    let state = ws.open("/does/not/exist").await;
    assert_eq!(state.route, Route::FolderBrowse { folder_id: None });
    assert!(state.panel_error.is_none());
}

#[tokio::test]
async fn unrelated_folder_gets_its_own_ancestor_chain() {
    let backend = tree();
    backend.seed_folder("z", "Zeta", None, "u1");
    let ws = workspace(&backend);

    ws.open("/folder/b").await;
    assert_eq!(path_ids(&ws), ["root", "a", "b"]);

    // sidebar entry while deep inside another branch
    let state = ws.navigate_to_folder("z", "Zeta").await;
    assert_eq!(state.url, "/folder/z");
    assert_eq!(path_ids(&ws), ["root", "z"]);

    // a subfolder shown in the grid is entered locally
    ws.navigate_to_folder("a", "Area").await;
    ws.navigate_to_folder("b", "Budget").await;
    assert_eq!(path_ids(&ws), ["root", "a", "b"]);
}

#[tokio::test]
async fn favorites_open_folders_under_their_real_parents() {
    let backend = tree();
    let ws = workspace(&backend);
    ws.open("/folder/a").await;
    ws.toggle_favorite(&EntityRef::folder("c")).await.unwrap();

    let state = ws.navigate_to_section(Section::Favorites).await;
    assert_eq!(path_ids(&ws), ["root"]);
    let ViewContent::Listing(listing) = state.content else {
        panic!("expected a listing");
    };
    let folder = listing.folders[0].clone();
    ws.open_item(&Content::Folder(folder)).await.unwrap();
    assert_eq!(path_ids(&ws), ["root", "a", "b", "c"]);

    // the create form outside the folder tree targets the root
    ws.navigate_to_section(Section::MyFiles).await;
    assert_eq!(ws.navigate_to_create_theme().await.url, "/new-theme");
}

#[tokio::test]
async fn older_load_finishing_last_does_not_win() {
    let backend = InMemBackend::new();
    backend.seed_folder("slow", "Slow", None, "u1");
    backend.seed_folder("fast", "Fast", None, "u1");
    backend.seed_folder("s1", "Inside slow", Some("slow"), "u1");
    backend.set_latency("slow", Duration::from_millis(50));
    let ws = workspace(&backend);

    let (older, newer) = tokio::join!(ws.open("/folder/slow"), ws.open("/folder/fast"));
    assert_eq!(newer.url, "/folder/fast");
    // the superseded load hands back what is on screen
    assert_eq!(older.url, "/folder/fast");
    assert_eq!(ws.view().url, "/folder/fast");
    assert!(grid_folders(&ws.view()).is_empty());
    assert_eq!(path_ids(&ws), ["root", "fast"]);
}

#[tokio::test]
async fn batch_restore_with_a_failing_record_still_clears_the_selection() {
    let backend = InMemBackend::new();
    backend.seed_folder("f1", "Reports", None, "u1");
    backend.seed_folder("f2", "Drafts", None, "u1");
    let ws = workspace(&backend);
    ws.open("/").await;
    ws.move_to_trash(&EntityRef::folder("f1")).await.unwrap();
    ws.move_to_trash(&EntityRef::folder("f2")).await.unwrap();

    let gone = {
        let mut trash = ws.trash().await.unwrap();
        trash.reload().await.unwrap();
        trash.select_all();
        trash.record_for(&EntityRef::folder("f2")).cloned().unwrap()
    };
    // purged elsewhere after the listing was loaded
    backend.delete_permanently(&gone).await.unwrap();

    let outcome = ws.restore_selected().await.unwrap();
    assert_eq!(outcome.succeeded.len(), 1);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0, gone);
    assert!(ws.trash().await.unwrap().selection().is_empty());
    assert_eq!(grid_folders(&ws.view()), ["f1"]);
}

#[tokio::test]
async fn batch_trash_operations_reconcile_the_workspace() {
    let backend = InMemBackend::new();
    backend.seed_folder("f1", "Reports", None, "u1");
    backend.seed_folder("f2", "Drafts", None, "u1");
    let ws = workspace(&backend);
    ws.open("/").await;
    ws.move_to_trash(&EntityRef::folder("f1")).await.unwrap();
    ws.move_to_trash(&EntityRef::folder("f2")).await.unwrap();
    assert!(ws.sidebar().is_empty());

    {
        let mut trash = ws.trash().await.unwrap();
        trash.reload().await.unwrap();
        trash.select_all();
    }
    ws.restore_selected().await.unwrap();
    assert_eq!(ws.sidebar().len(), 2);
    assert_eq!(grid_folders(&ws.view()).len(), 2);

    ws.move_to_trash(&EntityRef::folder("f1")).await.unwrap();
    ws.move_to_trash(&EntityRef::folder("f2")).await.unwrap();
    ws.navigate_to_section(Section::Trash).await;
    let confirmation = ws.trash().await.unwrap().confirm_empty().unwrap();
    let outcome = ws.empty_trash(&confirmation).await.unwrap();
    assert_eq!(outcome.succeeded.len(), 2);
    assert_eq!(ws.view().content, ViewContent::Trash(vec![]));
    assert!(ws.sidebar().is_empty());
}
