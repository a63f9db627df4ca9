//! Model repository extension bodies (load, unload, index).

use serde::{Deserialize, Serialize};

/// Response from `POST /v2/repository/models/{name}/load`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadResponse {
    pub name: String,
    pub load: bool,
}

/// Response from `POST /v2/repository/models/{name}/unload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnloadResponse {
    pub name: String,
    pub unload: bool,
}

/// Serving state of a registered model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelState {
    /// Registered and accepting inference.
    Ready,
    /// Registered but still loading (or failed to load).
    Unavailable,
}

impl ModelState {
    pub fn from_ready(ready: bool) -> Self {
        if ready {
            ModelState::Ready
        } else {
            ModelState::Unavailable
        }
    }
}

/// One entry of `POST /v2/repository/index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryIndexEntry {
    pub name: String,
    pub state: ModelState,
}
