//! In-process fake of the gateway's `/system` API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use gateway_client::FunctionStatus;

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub path: String,
    pub namespace: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Default)]
pub struct FakeGateway {
    pub namespaces: Vec<String>,
    pub functions: HashMap<String, Vec<FunctionStatus>>,
    pub fail_with: Option<StatusCode>,
    pub seen: Mutex<Vec<SeenRequest>>,
}

impl FakeGateway {
    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

fn record(gw: &FakeGateway, path: &str, ns: Option<String>, headers: &HeaderMap) {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    gw.seen.lock().unwrap().push(SeenRequest {
        path: path.to_string(),
        namespace: ns,
        authorization,
    });
}

async fn namespaces(State(gw): State<Arc<FakeGateway>>, headers: HeaderMap) -> impl IntoResponse {
    record(&gw, "/system/namespaces", None, &headers);
    if let Some(status) = gw.fail_with {
        return (status, "gateway unavailable").into_response();
    }
    Json(gw.namespaces.clone()).into_response()
}

async fn functions(
    State(gw): State<Arc<FakeGateway>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let ns = query.get("namespace").cloned();
    record(&gw, "/system/functions", ns.clone(), &headers);
    if let Some(status) = gw.fail_with {
        return (status, "gateway unavailable").into_response();
    }
    let list = gw
        .functions
        .get(ns.as_deref().unwrap_or(""))
        .cloned()
        .unwrap_or_default();
    Json(list).into_response()
}

/// Serve `gw` on an ephemeral port and return its base URL.
pub async fn serve(gw: Arc<FakeGateway>) -> String {
    let app = Router::new()
        .route("/system/namespaces", get(namespaces))
        .route("/system/functions", get(functions))
        .with_state(gw);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn function(name: &str, topic: Option<&str>) -> FunctionStatus {
    FunctionStatus {
        name: name.to_string(),
        annotations: topic.map(|t| HashMap::from([("topic".to_string(), t.to_string())])),
        ..Default::default()
    }
}
