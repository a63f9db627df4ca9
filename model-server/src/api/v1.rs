//! v1 protocol endpoints.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use model_server_common::ModelsResponse;
use serde_json::Value;

use crate::dispatch::{codec, DispatchRequest, Operation, Protocol};
use crate::error::{Error, Result};
use crate::state::AppState;

/// Build the v1 router.
///
/// `POST /v1/models/{name}:predict` and `:explain` share one path segment
/// with the model name, so the action is split off in the handler.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/models/:model", get(model_ready).post(model_action))
}

/// GET /v1/models - names of registered models.
async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.dispatcher.list_models().await,
    })
}

/// GET /v1/models/{name} - 200 when the model is ready.
async fn model_ready(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
) -> Result<Json<Value>> {
    let response = state
        .dispatcher
        .dispatch(DispatchRequest::new(&model, Protocol::V1, Operation::Ready))
        .await?;
    Ok(Json(response.payload))
}

/// POST /v1/models/{name}:predict and /v1/models/{name}:explain
async fn model_action(
    State(state): State<Arc<AppState>>,
    Path(segment): Path<String>,
    body: Bytes,
) -> Result<Json<Value>> {
    let (model, operation) = parse_action(&segment)?;
    let payload = codec::parse_v1_body(&body)?;

    let response = state
        .dispatcher
        .dispatch(DispatchRequest::new(model, Protocol::V1, operation).with_payload(payload))
        .await?;
    Ok(Json(response.payload))
}

/// Split `name:verb` into the model name and the requested operation.
fn parse_action(segment: &str) -> Result<(&str, Operation)> {
    match segment.rsplit_once(':') {
        Some((model, "predict")) if !model.is_empty() => Ok((model, Operation::Predict)),
        Some((model, "explain")) if !model.is_empty() => Ok((model, Operation::Explain)),
        _ => Err(Error::InvalidInput(format!(
            "unsupported model action '{}', expected <name>:predict or <name>:explain",
            segment
        ))),
    }
}
