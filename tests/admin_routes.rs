mod common;

use axum::http::StatusCode;
use common::{TestApp, logged_in};

#[tokio::test]
async fn public_category_list_is_read_once() {
    let app = TestApp::new();
    let mut browser = app.browser();

    let first = browser.get("/categories").await;
    assert_eq!(first.status, StatusCode::OK);
    let listed = first.json();
    let stubs: Vec<&str> = listed
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|row| row["stub"].as_str())
        .collect();
    assert_eq!(stubs, vec!["landscapes"]);

    let reads = app.store.category_reads();
    let second = browser.get("/categories").await;
    assert_eq!(second.json(), listed);
    assert_eq!(app.store.category_reads(), reads);
}

#[tokio::test]
async fn category_page_lists_only_public_photos() {
    let app = TestApp::new();
    let mut browser = app.browser();

    let page = browser.get("/categories/landscapes").await;
    assert_eq!(page.status, StatusCode::OK);
    let body = page.json();
    assert_eq!(body["category"]["name"], "Landscapes");
    let photos = body["photos"].as_array().expect("photos");
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0]["stub"], "lake");
    assert_eq!(photos[0]["encoded_name"], "lake%20at%20dawn.jpg");

    assert_eq!(
        browser.get("/categories/drafts").await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        browser.get("/photos/hidden").await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(browser.get("/photos/lake").await.status, StatusCode::OK);
}

#[tokio::test]
async fn category_update_invalidates_cached_reads() {
    let app = TestApp::new();
    let mut browser = logged_in(&app).await;

    assert_eq!(
        browser.get("/categories/landscapes").await.json()["category"]["name"],
        "Landscapes"
    );

    let reply = browser
        .post_form("/admin/categories/1", "name=Mountains&stub=mountains")
        .await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location.as_deref(), Some("/admin/categories"));

    let listing = browser.get("/admin/categories").await.json();
    assert_eq!(listing["flash"], "Category updated");

    assert_eq!(
        browser.get("/categories/landscapes").await.status,
        StatusCode::NOT_FOUND
    );
    let page = browser.get("/categories/mountains").await.json();
    assert_eq!(page["category"]["name"], "Mountains");

    let public = browser.get("/categories").await.json();
    assert_eq!(public[0]["name"], "Mountains");
}

#[tokio::test]
async fn created_categories_start_inactive() {
    let app = TestApp::new();
    let mut browser = logged_in(&app).await;

    // Warm the public list so creation has something to invalidate.
    browser.get("/categories").await;

    let reply = browser
        .post_form("/admin/categories", "name=Portraits&stub=portraits")
        .await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);

    let listing = browser.get("/admin/categories").await.json();
    assert_eq!(listing["flash"], "Category created");
    let names: Vec<&str> = listing["items"]
        .as_array()
        .expect("items")
        .iter()
        .filter_map(|row| row["name"].as_str())
        .collect();
    assert!(names.contains(&"Portraits"));

    let public = browser.get("/categories").await.json();
    assert_eq!(public.as_array().expect("array").len(), 1);
}

#[tokio::test]
async fn duplicate_stub_is_reported_through_the_error_value() {
    let app = TestApp::new();
    let mut browser = logged_in(&app).await;

    let reply = browser
        .post_form("/admin/categories", "name=Again&stub=landscapes")
        .await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);

    let listing = browser.get("/admin/categories").await.json();
    assert_eq!(listing["error"], "photo category stub already exists");
    assert!(listing["flash"].is_null());
}

#[tokio::test]
async fn photo_edit_queue_and_update() {
    let app = TestApp::new();
    let mut browser = logged_in(&app).await;

    let next = browser.get("/admin/photos/next").await.json();
    assert_eq!(next["photo"]["stub"], "hidden");

    let reply = browser
        .post_form("/admin/photos/11", "stub=revealed&active=true&category_id=1")
        .await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location.as_deref(), Some("/admin/photos"));

    let listing = browser.get("/admin/photos").await.json();
    assert_eq!(listing["flash"], "Photo updated");

    let next = browser.get("/admin/photos/next").await.json();
    assert!(next["photo"].is_null());

    let photo = browser.get("/photos/revealed").await;
    assert_eq!(photo.status, StatusCode::OK);
    assert_eq!(photo.json()["edited"], true);
    assert_eq!(
        browser.get("/photos/hidden").await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn clearing_the_cache_forces_fresh_reads() {
    let app = TestApp::new();
    let mut browser = logged_in(&app).await;

    browser.get("/categories").await;
    browser.get("/categories").await;
    let reads = app.store.category_reads();

    let reply = browser.post_form("/admin/cache/clear", "").await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.location.as_deref(), Some("/admin"));
    assert_eq!(browser.get("/admin").await.json()["flash"], "Cache cleared");

    browser.get("/categories").await;
    assert_eq!(app.store.category_reads(), reads + 1);
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let app = TestApp::new();
    let mut browser = app.browser();

    let reply = browser.get("/no/such/page").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    assert_eq!(
        browser.get("/health/db").await.status,
        StatusCode::NO_CONTENT
    );
}
