use axum::http::{self, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mock_server::{app, app_with_state, etag_for, AppState, Document};
use tower::ServiceExt;

const MISSING: &str = "/docs/00000000-0000-0000-0000-000000000000";

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn put_if_match(uri: &str, etag: &str, body: &str) -> Request<String> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .header(http::header::IF_MATCH, etag)
        .body(body.to_string())
        .unwrap()
}

fn empty(method: &str, uri: &str) -> Request<String> {
    Request::builder().method(method).uri(uri).body(String::new()).unwrap()
}

/// Create a document and return its id path and ETag.
async fn create(app: &Router, body: &str) -> (String, String) {
    let resp = app.clone().oneshot(json_request("POST", "/docs", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let location = resp.headers()[http::header::LOCATION].to_str().unwrap().to_string();
    let etag = resp.headers()[http::header::ETAG].to_str().unwrap().to_string();
    (location, etag)
}

// --- list ---

#[tokio::test]
async fn list_docs_empty() {
    let resp = app().oneshot(empty("GET", "/docs")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let docs: Vec<Document> = body_json(resp).await;
    assert!(docs.is_empty());
}

// --- create ---

#[tokio::test]
async fn create_doc_returns_201_with_location_and_etag() {
    let resp = app()
        .oneshot(json_request("POST", "/docs", r#"{"title":"Dune"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(resp.headers()[http::header::ETAG], etag_for(1).as_str());
    let location = resp.headers()[http::header::LOCATION].to_str().unwrap().to_string();
    let doc: Document = body_json(resp).await;
    assert_eq!(doc["title"], "Dune");
    assert_eq!(location, format!("/docs/{}", doc["id"].as_str().unwrap()));
}

#[tokio::test]
async fn create_doc_non_object_returns_422() {
    let resp = app().oneshot(json_request("POST", "/docs", "[1,2,3]")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// --- get ---

#[tokio::test]
async fn get_doc_not_found() {
    let resp = app().oneshot(empty("GET", MISSING)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_doc_bad_uuid_returns_400() {
    let resp = app().oneshot(empty("GET", "/docs/not-a-uuid")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- update ---

#[tokio::test]
async fn update_doc_not_found() {
    let resp = app()
        .oneshot(json_request("PUT", MISSING, r#"{"title":"Nope"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_with_matching_etag_bumps_version() {
    let app = app();
    let (uri, etag) = create(&app, r#"{"title":"Dune"}"#).await;

    let resp = app
        .clone()
        .oneshot(put_if_match(&uri, &etag, r#"{"title":"Dune Messiah"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[http::header::ETAG], etag_for(2).as_str());
    let doc: Document = body_json(resp).await;
    assert_eq!(doc["title"], "Dune Messiah");
    assert!(doc.contains_key("id"));
}

#[tokio::test]
async fn update_with_stale_etag_returns_412() {
    let app = app();
    let (uri, etag) = create(&app, r#"{"title":"Dune"}"#).await;

    let resp = app
        .clone()
        .oneshot(json_request("PUT", &uri, r#"{"title":"Someone else"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(put_if_match(&uri, &etag, r#"{"title":"Mine"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);

    let resp = app.clone().oneshot(empty("GET", &uri)).await.unwrap();
    let doc: Document = body_json(resp).await;
    assert_eq!(doc["title"], "Someone else");
}

#[tokio::test]
async fn update_with_wildcard_if_match_succeeds() {
    let app = app();
    let (uri, _) = create(&app, r#"{"title":"Dune"}"#).await;

    let resp = app
        .clone()
        .oneshot(put_if_match(&uri, "*", r#"{"title":"Any version"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[http::header::ETAG], etag_for(2).as_str());
}

#[tokio::test]
async fn injected_conflict_returns_409_once() {
    let state = AppState::new();
    let app = app_with_state(state.clone());
    let (uri, _) = create(&app, r#"{"title":"Dune"}"#).await;
    state.inject_conflicts(1);

    let resp = app
        .clone()
        .oneshot(json_request("PUT", &uri, r#"{"title":"Mine"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["resource"], uri);

    let resp = app
        .clone()
        .oneshot(json_request("PUT", &uri, r#"{"title":"Mine"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(state.pending_conflicts(), 0);
}

// --- delete ---

#[tokio::test]
async fn delete_doc_not_found() {
    let resp = app().oneshot(empty("DELETE", MISSING)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- full lifecycle ---

#[tokio::test]
async fn crud_lifecycle() {
    let app = app();

    let (uri, _) = create(&app, r#"{"title":"Walk dog"}"#).await;

    // list — one document
    let resp = app.clone().oneshot(empty("GET", "/docs")).await.unwrap();
    let docs: Vec<Document> = body_json(resp).await;
    assert_eq!(docs.len(), 1);

    // get
    let resp = app.clone().oneshot(empty("GET", &uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[http::header::ETAG], etag_for(1).as_str());
    let fetched: Document = body_json(resp).await;
    assert_eq!(fetched["title"], "Walk dog");

    // delete
    let resp = app.clone().oneshot(empty("DELETE", &uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    // get after delete — 404
    let resp = app.clone().oneshot(empty("GET", &uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // list after delete — empty
    let resp = app.clone().oneshot(empty("GET", "/docs")).await.unwrap();
    let docs: Vec<Document> = body_json(resp).await;
    assert!(docs.is_empty());
}
