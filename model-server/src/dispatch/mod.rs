//! Request dispatch.
//!
//! Every protocol endpoint builds a [`DispatchRequest`], hands it to the
//! [`Dispatcher`] and renders the [`DispatchResponse`] in its own wire
//! shape. The dispatcher resolves the model in the registry, checks
//! readiness, invokes the backend and translates backend failures into
//! [`Error`]; that translation happens here and nowhere else.

pub mod codec;

use std::sync::Arc;
use std::time::Duration;

use model_server_common::{LiveResponse, ModelReadyResponse, ServerLiveResponse, ServerMetadata};
use serde::Serialize;
use serde_json::Value;

use crate::backend::{BackendHandle, ModelRegistry};
use crate::error::{Error, Result};
use crate::model::{ModelCall, ModelError};

/// Extensions advertised by the v2 server metadata endpoint.
pub const EXTENSIONS: &[&str] = &["model_repository_extension"];

/// Wire protocol a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    V1,
    V2,
}

/// What a request asks of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Predict,
    Explain,
    Infer,
    Metadata,
    Ready,
    Live,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Predict => write!(f, "predict"),
            Operation::Explain => write!(f, "explain"),
            Operation::Infer => write!(f, "infer"),
            Operation::Metadata => write!(f, "metadata"),
            Operation::Ready => write!(f, "ready"),
            Operation::Live => write!(f, "live"),
        }
    }
}

/// Protocol-neutral form of an inbound call.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub model_name: String,
    pub model_version: Option<String>,
    pub protocol: Protocol,
    pub operation: Operation,
    /// Canonical payload; `Value::Null` for operations without a body.
    pub payload: Value,
}

impl DispatchRequest {
    pub fn new(model_name: &str, protocol: Protocol, operation: Operation) -> Self {
        Self {
            model_name: model_name.to_string(),
            model_version: None,
            protocol,
            operation,
            payload: Value::Null,
        }
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.model_version = version;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Protocol-neutral result of a dispatched call.
#[derive(Debug, Clone)]
pub struct DispatchResponse {
    pub model_name: String,
    pub model_version: Option<String>,
    pub payload: Value,
}

/// Resolves requests against the registry and invokes backends.
pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
    call_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<ModelRegistry>, call_timeout: Duration) -> Self {
        Self {
            registry,
            call_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Look up a registered model.
    pub async fn resolve(&self, name: &str) -> Result<BackendHandle> {
        self.registry
            .lookup(name)
            .await
            .ok_or_else(|| Error::ModelNotFound(name.to_string()))
    }

    /// Look up a registered model that is ready to serve.
    pub async fn resolve_ready(&self, name: &str) -> Result<BackendHandle> {
        let handle = self.resolve(name).await?;
        if !handle.is_ready() {
            return Err(Error::ModelNotReady(name.to_string()));
        }
        Ok(handle)
    }

    /// Execute a request.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchResponse> {
        let DispatchRequest {
            model_name,
            model_version,
            protocol,
            operation,
            payload,
        } = request;

        let payload = match operation {
            Operation::Predict | Operation::Infer | Operation::Explain => {
                let handle = self.resolve_ready(&model_name).await?;
                let call = if operation == Operation::Explain {
                    ModelCall::Explain
                } else {
                    ModelCall::Predict
                };

                tracing::debug!(
                    model = %model_name,
                    backend = %handle.backend_type(),
                    ?protocol,
                    "Dispatching {}",
                    operation
                );

                handle
                    .invoke(call, payload, self.call_timeout)
                    .await
                    .map_err(|e| translate(&model_name, operation, e))?
            }
            Operation::Metadata => {
                let handle = self.resolve(&model_name).await?;
                let mut metadata = handle.metadata();
                metadata.name = model_name.clone();
                if let Some(version) = &model_version {
                    if !metadata.versions.contains(version) {
                        metadata.versions.push(version.clone());
                    }
                }
                to_payload(&metadata)?
            }
            Operation::Ready => {
                self.resolve_ready(&model_name).await?;
                to_payload(&ModelReadyResponse {
                    name: model_name.clone(),
                    ready: true,
                })?
            }
            Operation::Live => match protocol {
                Protocol::V1 => to_payload(&LiveResponse::alive())?,
                Protocol::V2 => to_payload(&ServerLiveResponse { live: true })?,
            },
        };

        Ok(DispatchResponse {
            model_name,
            model_version,
            payload,
        })
    }

    /// Names of every registered model.
    pub async fn list_models(&self) -> Vec<String> {
        self.registry.list().await
    }

    /// Whether every registered model is ready. Always answered; an empty
    /// registry counts as ready.
    pub async fn server_ready(&self) -> bool {
        self.registry.all().await.iter().all(BackendHandle::is_ready)
    }

    pub fn server_metadata(&self) -> ServerMetadata {
        ServerMetadata {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extensions: EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Unknown(e.to_string()))
}

/// Map a backend failure onto the client-facing taxonomy.
fn translate(model: &str, operation: Operation, error: ModelError) -> Error {
    tracing::warn!(model = %model, "{} failed: {}", operation, error);
    match error {
        ModelError::InvalidInput(message) => Error::InvalidInput(message),
        ModelError::NotReady => Error::ModelNotReady(model.to_string()),
        ModelError::NotImplemented(what) => {
            Error::NotImplemented(format!("{} for model {}", what, model))
        }
        ModelError::Unknown(message) => Error::Unknown(message),
        other @ (ModelError::Inference(_) | ModelError::Timeout(_) | ModelError::Unavailable(_)) => {
            Error::Inference(other.to_string())
        }
    }
}
