//! Model abstraction layer.
//!
//! This module defines the `Model` trait implemented by everything the server
//! can execute, whether it is called in-process or hosted behind an actor
//! handle. How a model computes its outputs is entirely its own business;
//! the server only sees JSON values in and out.

mod builtin;

pub use builtin::{IdentityModel, ModelCatalog, SumModel};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use model_server_common::ModelMetadata;
use serde_json::Value;

/// Failures a model (or the transport to it) can report.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The payload does not have the shape the model expects.
    #[error("{0}")]
    InvalidInput(String),

    /// The model has not finished loading.
    #[error("model is not ready")]
    NotReady,

    /// The model does not provide the requested operation.
    #[error("{0} is not supported by this model")]
    NotImplemented(String),

    /// The model raised while executing.
    #[error("{0}")]
    Inference(String),

    /// A remote call did not complete in time.
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    /// The remote actor could not be reached or went away mid-call.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The model panicked.
    #[error("{0}")]
    Unknown(String),
}

/// The operations a backend executes on behalf of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCall {
    Predict,
    Explain,
}

impl std::fmt::Display for ModelCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelCall::Predict => write!(f, "predict"),
            ModelCall::Explain => write!(f, "explain"),
        }
    }
}

/// Primary trait for servable models.
///
/// Inputs and outputs are model-defined JSON values; v2 tensor requests
/// reach the model already converted to the same shape a v1 client would
/// send (`{"instances": [...]}`).
#[async_trait]
pub trait Model: Send + Sync {
    /// Unique name the model is registered under.
    fn name(&self) -> &str;

    /// Prepare the model for serving (weights, connections, warm-up).
    async fn load(&self) -> Result<(), ModelError> {
        Ok(())
    }

    /// Declared inputs and outputs, reported by the v2 metadata endpoint.
    fn metadata(&self) -> ModelMetadata {
        ModelMetadata::named(self.name())
    }

    /// Run inference.
    async fn predict(&self, input: Value) -> Result<Value, ModelError>;

    /// Explain a prediction. Models without an explainer keep the default.
    async fn explain(&self, _input: Value) -> Result<Value, ModelError> {
        Err(ModelError::NotImplemented("explain".to_string()))
    }
}

/// Dispatch one call to the matching trait method.
pub async fn call_model(model: &dyn Model, call: ModelCall, input: Value) -> Result<Value, ModelError> {
    match call {
        ModelCall::Predict => model.predict(input).await,
        ModelCall::Explain => model.explain(input).await,
    }
}

/// Source of model definitions for on-demand loading.
///
/// Where definitions live (a catalog, a model directory, a remote store) is
/// up to the implementation.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Construct a fresh model for `name`, or `None` when no definition exists.
    async fn resolve(&self, name: &str) -> Result<Option<Arc<dyn Model>>, ModelError>;
}
