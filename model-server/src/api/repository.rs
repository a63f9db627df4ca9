//! Model repository extension endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use model_server_common::{LoadResponse, RepositoryIndexEntry, UnloadResponse};

use crate::error::V2Error;
use crate::state::AppState;

/// Build the repository router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v2/repository/index", post(index))
        .route("/v2/repository/models/:model/load", post(load))
        .route("/v2/repository/models/:model/unload", post(unload))
}

/// POST /v2/repository/index - registered models with their state.
async fn index(State(state): State<Arc<AppState>>) -> Json<Vec<RepositoryIndexEntry>> {
    Json(state.repository.index().await)
}

/// POST /v2/repository/models/{name}/load
async fn load(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
) -> Result<Json<LoadResponse>, V2Error> {
    tracing::info!("Loading model {}", model);
    Ok(Json(state.repository.load(&model).await?))
}

/// POST /v2/repository/models/{name}/unload
async fn unload(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
) -> Result<Json<UnloadResponse>, V2Error> {
    tracing::info!("Unloading model {}", model);
    Ok(Json(state.repository.unload(&model).await?))
}
