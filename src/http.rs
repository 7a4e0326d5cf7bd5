//! HTTP surface: admission routes that add/remove instances and pods
//! (calling straight through to [`Controller`]), plus read-out routes —
//! instance listing, top-K reports, a push-on-tick WebSocket feed, and
//! `/metrics`.
//!
//! The read-out side is conceptually grounded on `server/server.go`'s
//! "push a report down the socket on every tick" dashboard, re-expressed
//! with axum (the teacher's HTTP framework) instead of fiber; the HTML
//! dashboard itself is out of scope, only the JSON/WebSocket data surface
//! is carried over.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::controller::Controller;
use crate::repository::Repository;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    pub repository: Arc<Repository>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/instances", get(list_instances).post(add_instance))
        .route("/instances/:id", delete(remove_instance))
        .route("/instances/:id/report", get(instance_report))
        .route("/instances/:id/ws", get(instance_ws))
        .route("/instances/:id/pods/:pod_id", post(add_pod).delete(remove_pod))
        .route("/metrics", get(metrics))
        .with_state(state)
}

#[derive(Serialize)]
struct InstancesResponse {
    instances: Vec<String>,
}

async fn list_instances(State(state): State<AppState>) -> impl IntoResponse {
    Json(InstancesResponse {
        instances: state.controller.instances().ids(),
    })
}

#[derive(Deserialize)]
struct AddInstanceRequest {
    name: String,
    zones: Vec<String>,
}

async fn add_instance(
    State(state): State<AppState>,
    Json(req): Json<AddInstanceRequest>,
) -> impl IntoResponse {
    state.controller.add_instance(&req.name, req.zones);
    axum::http::StatusCode::CREATED
}

async fn remove_instance(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.controller.remove_instance(&id) {
        Ok(()) => axum::http::StatusCode::NO_CONTENT,
        Err(err) => {
            warn!(instance = %id, error = %err, "failed to remove instance");
            axum::http::StatusCode::NOT_FOUND
        }
    }
}

#[derive(Deserialize)]
struct AddPodRequest {
    pod_ip: String,
}

async fn add_pod(
    State(state): State<AppState>,
    Path((instance_id, pod_id)): Path<(String, String)>,
    Json(req): Json<AddPodRequest>,
) -> impl IntoResponse {
    match state.controller.add_pod(&instance_id, &pod_id, &req.pod_ip) {
        Ok(()) => axum::http::StatusCode::CREATED.into_response(),
        Err(err) => {
            warn!(instance = %instance_id, pod = %pod_id, error = %err, "failed to add pod");
            (axum::http::StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
    }
}

async fn remove_pod(
    State(state): State<AppState>,
    Path((instance_id, pod_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.controller.remove_pod(&instance_id, &pod_id) {
        Ok(()) => axum::http::StatusCode::NO_CONTENT,
        Err(err) => {
            warn!(instance = %instance_id, pod = %pod_id, error = %err, "failed to remove pod");
            axum::http::StatusCode::NOT_FOUND
        }
    }
}

async fn instance_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.repository.report(&id) {
        Some(records) => Json(records).into_response(),
        None => axum::http::StatusCode::NOT_FOUND.into_response(),
    }
}

async fn instance_ws(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| push_reports(socket, state, id))
}

/// Pushes the instance's current top-K report every second until the
/// client disconnects, matching `server.go`'s unconditional tick-driven
/// push rather than a request/response poll.
async fn push_reports(mut socket: WebSocket, state: AppState, instance_id: String) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let Some(records) = state.repository.report(&instance_id) else {
            debug!(instance = %instance_id, "no report yet, skipping push");
            continue;
        };
        let payload = match serde_json::to_string(&records) {
            Ok(p) => p,
            Err(err) => {
                warn!(instance = %instance_id, error = %err, "failed to serialize report");
                continue;
            }
        };
        if socket.send(Message::Text(payload)).await.is_err() {
            debug!(instance = %instance_id, "websocket client disconnected");
            break;
        }
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.metrics().encode() {
        Ok(body) => (
            [("Content-Type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "failed to encode metrics");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
