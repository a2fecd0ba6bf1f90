//! Shared fixtures: an in-process backend, a scripted identity provider and
//! a recording navigator.
//!
//! `#![allow(dead_code)]`: each integration test file is its own crate and
//! uses a different subset of these helpers.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use todo_session::{Error, IdentityProvider, LoginOptions, Navigator, TokenOptions};

// =============================================================================
// Backend
// =============================================================================

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

#[derive(Default)]
pub struct Backend {
    pub tasks: Vec<Value>,
    pub task_types: Vec<Value>,
    pub next_id: u64,
    /// `None` accepts any credential, including none.
    pub accepted_tokens: Option<HashSet<String>>,
    /// Delay between snapshotting the task list and answering.
    pub list_delay: Option<Duration>,
    pub requests: Vec<Recorded>,
}

pub type Shared = Arc<Mutex<Backend>>;

impl Backend {
    pub fn seeded() -> Shared {
        Arc::new(Mutex::new(Self {
            tasks: vec![
                json!({ "id": 1, "title": "Write report", "description": "", "completed": false, "todo_type": null }),
                json!({ "id": 2, "title": "Call bank", "description": "", "completed": true, "todo_type": null }),
            ],
            task_types: vec![
                json!({ "id": 1, "name": "Work", "description": "Office things" }),
                json!({ "id": 2, "name": "Home", "description": "" }),
            ],
            next_id: 3,
            accepted_tokens: None,
            list_delay: None,
            requests: Vec::new(),
        }))
    }

    pub fn accept_only(shared: &Shared, tokens: &[&str]) {
        shared.lock().accepted_tokens = Some(tokens.iter().map(|t| (*t).to_string()).collect());
    }

    pub fn requests(shared: &Shared) -> Vec<Recorded> {
        shared.lock().requests.clone()
    }

    pub fn count(shared: &Shared, method: Method, path: &str) -> usize {
        shared
            .lock()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Records the request; returns a 403 if the credential is not accepted.
fn admit(
    state: &Shared,
    method: Method,
    path: String,
    headers: &HeaderMap,
    body: Option<Value>,
) -> Result<(), Response> {
    let bearer = bearer(headers);
    let mut backend = state.lock();
    backend.requests.push(Recorded {
        method,
        path,
        bearer: bearer.clone(),
        body,
    });
    match &backend.accepted_tokens {
        Some(accepted) if !bearer.is_some_and(|b| accepted.contains(&b)) => {
            Err((StatusCode::FORBIDDEN, "invalid token").into_response())
        }
        _ => Ok(()),
    }
}

async fn list_tasks(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if let Err(denied) = admit(&state, Method::GET, "/api/todos/".into(), &headers, None) {
        return denied;
    }
    let (tasks, delay) = {
        let backend = state.lock();
        (backend.tasks.clone(), backend.list_delay)
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    Json(tasks).into_response()
}

async fn create_task(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(denied) = admit(&state, Method::POST, "/api/todos/".into(), &headers, Some(body.clone())) {
        return denied;
    }
    let mut backend = state.lock();
    let id = backend.next_id;
    backend.next_id += 1;
    let task_type = body
        .get("todo_type_id")
        .and_then(Value::as_u64)
        .and_then(|tid| {
            backend
                .task_types
                .iter()
                .find(|t| t["id"].as_u64() == Some(tid))
                .cloned()
        });
    let task = json!({
        "id": id,
        "title": body["title"],
        "description": "",
        "completed": false,
        "todo_type": task_type,
    });
    backend.tasks.push(task.clone());
    (StatusCode::CREATED, Json(task)).into_response()
}

async fn update_task(
    State(state): State<Shared>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let path = format!("/api/todos/{id}/");
    if let Err(denied) = admit(&state, Method::PATCH, path, &headers, Some(body.clone())) {
        return denied;
    }
    let mut backend = state.lock();
    let Some(task) = backend.tasks.iter_mut().find(|t| t["id"].as_u64() == Some(id)) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if let Some(completed) = body.get("completed").and_then(Value::as_bool) {
        task["completed"] = json!(completed);
    }
    Json(task.clone()).into_response()
}

async fn delete_task(
    State(state): State<Shared>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Response {
    let path = format!("/api/todos/{id}/");
    if let Err(denied) = admit(&state, Method::DELETE, path, &headers, None) {
        return denied;
    }
    let mut backend = state.lock();
    let before = backend.tasks.len();
    backend.tasks.retain(|t| t["id"].as_u64() != Some(id));
    if backend.tasks.len() == before {
        return (StatusCode::NOT_FOUND, "No Todo matches the given query.").into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn list_task_types(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if let Err(denied) = admit(&state, Method::GET, "/api/todo-types/".into(), &headers, None) {
        return denied;
    }
    Json(state.lock().task_types.clone()).into_response()
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
}

async fn search(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Response {
    let path = format!("/api/youtube/search/?q={}", params.q);
    if let Err(denied) = admit(&state, Method::GET, path, &headers, None) {
        return denied;
    }
    match params.q.as_str() {
        "boom" => (StatusCode::BAD_GATEWAY, "upstream down").into_response(),
        "cat" => Json(json!({ "suggestions": ["cats", "category", "catalog"] })).into_response(),
        other => Json(json!({ "suggestions": [format!("{other} video")] })).into_response(),
    }
}

pub fn backend_router(state: Shared) -> Router {
    Router::new()
        .route("/api/todos/", get(list_tasks).post(create_task))
        .route("/api/todos/{id}/", axum::routing::patch(update_task).delete(delete_task))
        .route("/api/todo-types/", get(list_task_types))
        .route("/api/youtube/search/", get(search))
        .with_state(state)
}

/// Serve `router` on an ephemeral loopback port; returns its origin.
pub async fn serve(router: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/").parse().unwrap()
}

/// Start the backend; returns the API base (`http://127.0.0.1:<port>/api/`).
pub async fn spawn_backend(state: Shared) -> Url {
    serve(backend_router(state)).await.join("api/").unwrap()
}

// =============================================================================
// Identity provider and navigator
// =============================================================================

/// Hands out scripted token results in order; falls back to `fallback`.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, String>>>,
    fallback: Result<String, String>,
    pub calls: AtomicUsize,
    pub forced: AtomicUsize,
    pub logins: AtomicUsize,
    pub logouts: AtomicUsize,
    pub last_return_to: Mutex<Option<String>>,
}

impl ScriptedProvider {
    pub fn always(token: &str) -> Self {
        Self::new(Vec::new(), Ok(token.to_string()))
    }

    pub fn failing() -> Self {
        Self::new(Vec::new(), Err("login_required".into()))
    }

    pub fn new(script: Vec<Result<String, String>>, fallback: Result<String, String>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            forced: AtomicUsize::new(0),
            logins: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
            last_return_to: Mutex::new(None),
        }
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn forced(&self) -> usize {
        self.forced.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for ScriptedProvider {
    async fn login(&self, options: LoginOptions) -> Result<(), Error> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        *self.last_return_to.lock() = options.return_to;
        Ok(())
    }

    async fn logout(&self) -> Result<(), Error> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_token_silently(&self, options: TokenOptions) -> Result<String, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if options.force_refresh {
            self.forced.fetch_add(1, Ordering::SeqCst);
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
            .map_err(Error::Auth)
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    pub redirects: Mutex<Vec<Url>>,
    pub reloads: AtomicUsize,
    pub opened: Mutex<Vec<Url>>,
    pub location: Mutex<Option<String>>,
}

impl RecordingNavigator {
    pub fn at(path: &str) -> Self {
        let navigator = Self::default();
        *navigator.location.lock() = Some(path.to_string());
        navigator
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, url: &Url) {
        self.redirects.lock().push(url.clone());
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }

    fn open(&self, url: &Url) {
        self.opened.lock().push(url.clone());
    }

    fn location(&self) -> Option<String> {
        self.location.lock().clone()
    }
}
