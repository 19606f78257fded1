//! Scriptable in-process backend for request-glue tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, Uri},
    Json, Router,
};
use serde_json::Value;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub route: String,
    pub query: HashMap<String, String>,
    pub body: Value,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    responses: Arc<Mutex<HashMap<String, VecDeque<(u16, Value)>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

fn route_key(method: &str, route: &str) -> String {
    format!("{} {}", method.to_ascii_uppercase(), route)
}

impl MockBackend {
    /// Binds an ephemeral port and returns the backend with its base url.
    pub async fn start() -> (Self, String) {
        let backend = Self::default();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = Router::new().fallback(handle).with_state(backend.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (backend, format!("http://{addr}"))
    }

    /// Queues a response. `route` is the `path` query value for `api`
    /// calls (`/v3/clusters`) and the relative endpoint otherwise
    /// (`manager/list_users`). The last queued response repeats.
    pub fn respond(&self, method: &str, route: &str, status: u16, body: Value) -> &Self {
        self.responses
            .lock()
            .expect("responses")
            .entry(route_key(method, route))
            .or_default()
            .push_back((status, body));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests").clone()
    }

    pub fn requests_to(&self, method: &str, route: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == method && request.route == route)
            .collect()
    }
}

async fn handle(
    State(backend): State<MockBackend>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let query: HashMap<String, String> =
        url::form_urlencoded::parse(uri.query().unwrap_or_default().as_bytes())
            .into_owned()
            .collect();
    let route = if uri.path() == "/api" {
        query.get("path").cloned().unwrap_or_default()
    } else {
        uri.path().trim_start_matches('/').to_string()
    };

    backend.requests.lock().expect("requests").push(RecordedRequest {
        method: method.as_str().to_string(),
        route: route.clone(),
        query,
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    let scripted = {
        let mut responses = backend.responses.lock().expect("responses");
        responses
            .get_mut(&route_key(method.as_str(), &route))
            .and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
    };

    match scripted {
        Some((status, body)) => (
            StatusCode::from_u16(status).expect("status"),
            Json(body),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"message": format!("no route for {route}")})),
        ),
    }
}
