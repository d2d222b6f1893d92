//! In-memory JSON document server with ETag preconditions.
//!
//! Every document carries a version; GET and PUT responses expose it as a
//! quoted `ETag`. A PUT whose `If-Match` names an older version is refused
//! with 412. `AppState::inject_conflicts` makes the next PUTs answer 409, the
//! way a server reports a failed transaction.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub type Document = Map<String, Value>;

#[derive(Clone, Debug)]
struct Stored {
    version: u64,
    body: Document,
}

impl Stored {
    fn etag(&self) -> String {
        etag_for(self.version)
    }
}

pub fn etag_for(version: u64) -> String {
    format!("\"{version}\"")
}

#[derive(Clone, Default)]
pub struct AppState {
    db: Arc<RwLock<HashMap<Uuid, Stored>>>,
    pending_conflicts: Arc<AtomicU32>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` PUTs on existing documents answer 409.
    pub fn inject_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn pending_conflicts(&self) -> u32 {
        self.pending_conflicts.load(Ordering::SeqCst)
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub fn app() -> Router {
    app_with_state(AppState::new())
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/docs", get(list_docs).post(create_doc))
        .route("/docs/{id}", get(get_doc).put(update_doc).delete(delete_doc))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, AppState::new()).await
}

pub async fn run_with_state(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

fn with_id(id: Uuid, body: &Document) -> Document {
    let mut out = body.clone();
    out.insert("id".to_string(), Value::String(id.to_string()));
    out
}

async fn list_docs(State(state): State<AppState>) -> Json<Vec<Document>> {
    let db = state.db.read().await;
    Json(db.iter().map(|(id, stored)| with_id(*id, &stored.body)).collect())
}

async fn create_doc(State(state): State<AppState>, Json(input): Json<Document>) -> Response {
    let id = Uuid::new_v4();
    let stored = Stored {
        version: 1,
        body: with_id(id, &input),
    };
    let etag = stored.etag();
    let body = stored.body.clone();
    state.db.write().await.insert(id, stored);
    tracing::debug!(%id, "document created");
    (
        StatusCode::CREATED,
        [(header::LOCATION, format!("/docs/{id}")), (header::ETAG, etag)],
        Json(body),
    )
        .into_response()
}

async fn get_doc(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let db = state.db.read().await;
    match db.get(&id) {
        Some(stored) => ([(header::ETAG, stored.etag())], Json(stored.body.clone())).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn update_doc(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<Document>,
) -> Response {
    let mut db = state.db.write().await;
    let Some(stored) = db.get_mut(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if state.take_conflict() {
        tracing::debug!(%id, "injected conflict");
        return (StatusCode::CONFLICT, Json(json!({ "resource": format!("/docs/{id}") }))).into_response();
    }

    let if_match = headers.get(header::IF_MATCH).and_then(|v| v.to_str().ok());
    if let Some(expected) = if_match {
        // `*` matches any current representation.
        if expected != "*" && expected != stored.etag() {
            tracing::debug!(%id, expected, current = %stored.etag(), "precondition failed");
            return StatusCode::PRECONDITION_FAILED.into_response();
        }
    }

    stored.version += 1;
    stored.body = with_id(id, &input);
    ([(header::ETAG, stored.etag())], Json(stored.body.clone())).into_response()
}

async fn delete_doc(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    let mut db = state.db.write().await;
    db.remove(&id).map(|_| StatusCode::NO_CONTENT).unwrap_or(StatusCode::NOT_FOUND)
}
