use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kbase::api::{CatalogApi, FolderApi};
use kbase::favorites::Favorites;
use kbase::form::ThemeForm;
use kbase::models::{ContentKind, Priority};
use kbase::trash::Trash;
use kbase::{ApiError, HttpBackend};

fn theme_json(id: &str, priority: u8, is_draft: bool) -> serde_json::Value {
    json!({
        "id": id,
        "title": "Onboarding",
        "description": "<p>Welcome</p>",
        "priority": priority,
        "folder_id": "root",
        "keywords": ["x"],
        "author": { "id": "u1", "first_name": "Ana", "last_name": "Ruiz" },
        "areas": ["A1"],
        "positions": ["P1"],
        "is_draft": is_draft,
        "created_at": "2024-05-01T10:00:00Z",
        "updated_at": "2024-05-01T10:00:00Z"
    })
}

#[tokio::test]
async fn favorite_add_conflict_counts_as_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/favorites/themes"))
        .and(body_partial_json(json!({ "user_id": "u1", "id": "t1" })))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({ "error": "already favorited" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/favorites/user/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "folders": [], "themes": ["t1"], "files": [] })))
        .mount(&server)
        .await;

    let favorites = Favorites::new(Arc::new(HttpBackend::new(server.uri())), "u1");
    let member = favorites.toggle(ContentKind::Theme, "t1").await.unwrap();
    assert!(member);
    assert!(favorites.contains(ContentKind::Theme, "t1"));
}

#[tokio::test]
async fn publishing_high_priority_theme_sends_numeric_priority() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/positions"))
        .and(query_param("areas", "A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "P1", "name": "Analyst", "area_id": "A1" }])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/themes"))
        .and(body_partial_json(json!({
            "priority": 2,
            "is_draft": false,
            "areas": ["A1"],
            "positions": ["P1"],
            "keywords": ["x"],
            "author": "u1"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(theme_json("t-new", 2, false)))
        .expect(1)
        .mount(&server)
        .await;

    let mut form = ThemeForm::for_create(Arc::new(HttpBackend::new(server.uri())), "u1", "root");
    form.title = "Onboarding".into();
    assert!(form.set_priority_label("Alta"));
    form.toggle_area("A1").await.unwrap();
    assert!(form.toggle_position("P1"));
    form.add_tag("x");

    let theme = form.publish().await.unwrap();
    assert_eq!(theme.priority, Priority::High);
    assert!(!theme.is_draft);
    assert_eq!(theme.author.display_name(), "Ana Ruiz");
}

#[tokio::test]
async fn trash_listing_keeps_rows_whose_entity_is_gone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trash/user/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "tr1", "content_type": "Folder", "original_id": "f1", "created_at": "2024-05-02T10:00:00Z", "user_id": "u1" },
            { "id": "tr2", "content_type": "Theme", "original_id": "t9", "created_at": "2024-05-01T10:00:00Z",
              "expires_at": "2024-05-31T10:00:00Z", "user_id": "u1" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/folders/trash/f1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "f1", "name": "Reports", "created_at": "2024-04-01T10:00:00Z",
            "updated_at": "2024-04-01T10:00:00Z", "created_by": "u1"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/themes/trash/t9"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut trash = Trash::new(Arc::new(HttpBackend::new(server.uri())), "u1");
    assert_eq!(trash.reload().await.unwrap(), 2);
    let names: Vec<String> = trash.entries().iter().map(|e| e.display_name()).collect();
    assert_eq!(names, ["Reports", "Untitled theme"]);
    assert!(trash.entry("tr2").unwrap().content.is_none());

    let confirm = trash.confirm_delete("tr1").unwrap();
    assert_eq!(confirm.message(), "Delete folder \"Reports\" permanently? This cannot be undone.");
}

#[tokio::test]
async fn error_bodies_map_onto_the_taxonomy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/folders/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "boom" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/folders/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(server.uri());
    assert_eq!(
        backend.get_folder("broken").await.unwrap_err(),
        ApiError::Status { status: 500, message: "boom".into() }
    );
    assert_eq!(backend.get_folder("missing").await.unwrap_err(), ApiError::NotFound);
}

#[tokio::test]
async fn scoped_catalog_queries_join_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sections"))
        .and(query_param("models", "m 1,m2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "s1", "name": "Intro", "ai_model_id": "m 1" },
            { "id": "s2", "name": "Billing", "ai_model_id": "m2" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpBackend::new(server.uri());
    let sections = backend.list_sections(&["m 1".to_string(), "m2".to_string()]).await.unwrap();
    assert_eq!(sections.len(), 2);
}
