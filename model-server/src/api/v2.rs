//! v2 protocol endpoints: model metadata, model readiness and infer.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use model_server_common::InferenceResponse;
use serde_json::Value;
use uuid::Uuid;

use crate::dispatch::{codec, DispatchRequest, Operation, Protocol};
use crate::error::V2Error;
use crate::state::AppState;

type V2Result<T> = std::result::Result<T, V2Error>;

/// Build the v2 router.
///
/// Infer is reachable under both prefixes: `/v2/models/...` and the
/// `/v1/models/{name}/infer` form older clients use.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v2/models/:model", get(model_metadata))
        .route("/v2/models/:model/versions/:version", get(model_metadata_versioned))
        .route("/v2/models/:model/ready", get(model_ready))
        .route("/v2/models/:model/versions/:version/ready", get(model_ready_versioned))
        .route("/v2/models/:model/infer", post(infer))
        .route("/v2/models/:model/versions/:version/infer", post(infer_versioned))
        .route("/v1/models/:model/infer", post(infer))
        .route("/v1/models/:model/versions/:version/infer", post(infer_versioned))
}

async fn model_metadata(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
) -> V2Result<Json<Value>> {
    metadata(&state, &model, None).await
}

async fn model_metadata_versioned(
    State(state): State<Arc<AppState>>,
    Path((model, version)): Path<(String, String)>,
) -> V2Result<Json<Value>> {
    metadata(&state, &model, Some(version)).await
}

async fn metadata(state: &AppState, model: &str, version: Option<String>) -> V2Result<Json<Value>> {
    let response = state
        .dispatcher
        .dispatch(DispatchRequest::new(model, Protocol::V2, Operation::Metadata).with_version(version))
        .await?;
    Ok(Json(response.payload))
}

async fn model_ready(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
) -> V2Result<Json<Value>> {
    ready(&state, &model, None).await
}

async fn model_ready_versioned(
    State(state): State<Arc<AppState>>,
    Path((model, version)): Path<(String, String)>,
) -> V2Result<Json<Value>> {
    ready(&state, &model, Some(version)).await
}

async fn ready(state: &AppState, model: &str, version: Option<String>) -> V2Result<Json<Value>> {
    let response = state
        .dispatcher
        .dispatch(DispatchRequest::new(model, Protocol::V2, Operation::Ready).with_version(version))
        .await?;
    Ok(Json(response.payload))
}

/// POST .../models/{name}/infer
async fn infer(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
    body: Bytes,
) -> V2Result<Json<InferenceResponse>> {
    run_infer(&state, &model, None, &body).await
}

/// POST .../models/{name}/versions/{version}/infer
async fn infer_versioned(
    State(state): State<Arc<AppState>>,
    Path((model, version)): Path<(String, String)>,
    body: Bytes,
) -> V2Result<Json<InferenceResponse>> {
    run_infer(&state, &model, Some(version), &body).await
}

async fn run_infer(
    state: &AppState,
    model: &str,
    version: Option<String>,
    body: &[u8],
) -> V2Result<Json<InferenceResponse>> {
    let request = codec::parse_v2_body(body)?;
    let payload = codec::v2_request_to_payload(&request)?;

    let response = state
        .dispatcher
        .dispatch(
            DispatchRequest::new(model, Protocol::V2, Operation::Infer)
                .with_version(version)
                .with_payload(payload),
        )
        .await?;

    let outputs = codec::payload_to_v2_outputs(&response.payload, request.outputs.as_deref())?;

    Ok(Json(InferenceResponse {
        model_name: response.model_name,
        model_version: response.model_version,
        id: request.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        parameters: None,
        outputs,
    }))
}
