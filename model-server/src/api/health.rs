//! Liveness, readiness, server metadata and metrics endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use model_server_common::{ServerMetadata, ServerReadyResponse};
use serde_json::Value;

use crate::dispatch::{DispatchRequest, Operation, Protocol};
use crate::error::{Result, V2Error};
use crate::state::AppState;

/// Routes shared by every protocol: `/` and `/metrics`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(live))
        .route("/metrics", get(metrics))
}

/// v2 server-level routes.
pub fn v2_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v2", get(server_metadata))
        .route("/v2/health/live", get(server_live))
        .route("/v2/health/ready", get(server_ready))
}

/// GET / - 200 while the process is up.
async fn live(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let response = state
        .dispatcher
        .dispatch(DispatchRequest::new("", Protocol::V1, Operation::Live))
        .await?;
    Ok(Json(response.payload))
}

/// GET /metrics - Prometheus text exposition.
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let registered = state.registry().count().await;
    let body = format!(
        "# HELP model_server_up Whether the model server is up\n\
         # TYPE model_server_up gauge\n\
         model_server_up 1\n\
         # HELP model_server_registered_models Number of registered models\n\
         # TYPE model_server_registered_models gauge\n\
         model_server_registered_models {}\n\
         # HELP model_server_info Server information\n\
         # TYPE model_server_info gauge\n\
         model_server_info{{version=\"{}\"}} 1\n",
        registered,
        env!("CARGO_PKG_VERSION")
    );
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response()
}

/// GET /v2 - server name, version and extensions.
async fn server_metadata(State(state): State<Arc<AppState>>) -> Json<ServerMetadata> {
    Json(state.dispatcher.server_metadata())
}

/// GET /v2/health/live
async fn server_live(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<Value>, V2Error> {
    let response = state
        .dispatcher
        .dispatch(DispatchRequest::new("", Protocol::V2, Operation::Live))
        .await?;
    Ok(Json(response.payload))
}

/// GET /v2/health/ready - always 200 while the process is up; the body
/// reports whether every registered model is ready.
async fn server_ready(State(state): State<Arc<AppState>>) -> Json<ServerReadyResponse> {
    Json(ServerReadyResponse {
        ready: state.dispatcher.server_ready().await,
    })
}
