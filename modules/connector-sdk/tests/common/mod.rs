//! In-process gateway: serves the `/system` discovery API and records function invocations.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use connector_sdk::{InvokerResponse, ResponseSubscriber};
use gateway_client::FunctionStatus;

#[derive(Debug, Clone)]
pub struct Invocation {
    pub route: String,
    pub function: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Invocation {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Default)]
pub struct FakeGateway {
    pub namespaces: Mutex<Vec<String>>,
    pub functions: Mutex<HashMap<String, Vec<FunctionStatus>>>,
    pub system_down: AtomicBool,
    /// Canned replies per function. Unlisted functions echo the request body with 200.
    pub replies: Mutex<HashMap<String, (StatusCode, String)>>,
    pub delay: Mutex<Option<Duration>>,
    pub system_requests: Mutex<Vec<String>>,
    pub invocations: Mutex<Vec<Invocation>>,
}

impl FakeGateway {
    pub fn with_functions(namespace: &str, functions: Vec<FunctionStatus>) -> Self {
        let gw = Self::default();
        gw.functions
            .lock()
            .unwrap()
            .insert(namespace.to_string(), functions);
        gw
    }

    pub fn reply(&self, function: &str, status: StatusCode, body: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(function.to_string(), (status, body.to_string()));
    }

    pub fn set_down(&self, down: bool) {
        self.system_down.store(down, Ordering::SeqCst);
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invoked_functions(&self) -> Vec<String> {
        self.invocations().into_iter().map(|i| i.function).collect()
    }

    pub fn system_requests(&self) -> Vec<String> {
        self.system_requests.lock().unwrap().clone()
    }
}

async fn list_namespaces(State(gw): State<Arc<FakeGateway>>) -> impl IntoResponse {
    gw.system_requests
        .lock()
        .unwrap()
        .push("/system/namespaces".to_string());
    if gw.system_down.load(Ordering::SeqCst) {
        return (StatusCode::BAD_GATEWAY, "gateway unavailable").into_response();
    }
    Json(gw.namespaces.lock().unwrap().clone()).into_response()
}

async fn list_functions(
    State(gw): State<Arc<FakeGateway>>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let ns = query.get("namespace").cloned().unwrap_or_default();
    gw.system_requests
        .lock()
        .unwrap()
        .push(format!("/system/functions?namespace={ns}"));
    if gw.system_down.load(Ordering::SeqCst) {
        return (StatusCode::BAD_GATEWAY, "gateway unavailable").into_response();
    }
    let list = gw
        .functions
        .lock()
        .unwrap()
        .get(&ns)
        .cloned()
        .unwrap_or_default();
    Json(list).into_response()
}

async fn handle_invocation(
    gw: Arc<FakeGateway>,
    route: &str,
    function: String,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let delay = *gw.delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    gw.invocations.lock().unwrap().push(Invocation {
        route: route.to_string(),
        function: function.clone(),
        headers,
        body: body.clone(),
    });

    let reply = gw.replies.lock().unwrap().get(&function).cloned();
    match reply {
        Some((status, text)) => (status, text).into_response(),
        None if route == "/async-function" => StatusCode::ACCEPTED.into_response(),
        None => (StatusCode::OK, body).into_response(),
    }
}

async fn invoke_sync(
    State(gw): State<Arc<FakeGateway>>,
    Path(function): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_invocation(gw, "/function", function, headers, body).await
}

async fn invoke_async(
    State(gw): State<Arc<FakeGateway>>,
    Path(function): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_invocation(gw, "/async-function", function, headers, body).await
}

/// Serve `gw` on an ephemeral port and return its base URL.
pub async fn serve(gw: Arc<FakeGateway>) -> String {
    let app = Router::new()
        .route("/system/namespaces", get(list_namespaces))
        .route("/system/functions", get(list_functions))
        .route("/function/{name}", post(invoke_sync))
        .route("/async-function/{name}", post(invoke_async))
        .with_state(gw);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Base URL of a port nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn function(name: &str, topic: &str) -> FunctionStatus {
    FunctionStatus {
        name: name.to_string(),
        annotations: Some(HashMap::from([("topic".to_string(), topic.to_string())])),
        ..Default::default()
    }
}

/// Subscriber that keeps every response it is handed.
#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<InvokerResponse>>,
}

impl Recorder {
    pub fn seen(&self) -> Vec<InvokerResponse> {
        self.seen.lock().unwrap().clone()
    }

    /// Wait until at least `n` responses arrived, failing after two seconds.
    pub async fn wait_for(&self, n: usize) -> Vec<InvokerResponse> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let seen = self.seen();
                if seen.len() >= n {
                    return seen;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscriber did not receive responses in time")
    }
}

#[async_trait]
impl ResponseSubscriber for Recorder {
    async fn response(&self, res: &InvokerResponse) {
        self.seen.lock().unwrap().push(res.clone());
    }
}
