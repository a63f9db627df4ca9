//! Error types for the model server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::actor::DeployError;

/// Errors surfaced to clients by the serving path.
///
/// Every failure of a request is translated into one of these exactly once,
/// at the dispatch boundary; the worker keeps serving afterwards.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model with name {0} does not exist")]
    ModelNotFound(String),

    #[error("Model with name {0} is not ready")]
    ModelNotReady(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Internal error: {0}")]
    Unknown(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::ModelNotFound(_) => StatusCode::NOT_FOUND,
            Error::ModelNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Error::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::ModelNotFound(_) => "model_not_found",
            Error::ModelNotReady(_) => "model_not_ready",
            Error::NotImplemented(_) => "not_implemented",
            Error::Inference(_) => "inference_error",
            Error::Unknown(_) => "unknown_error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "type": self.error_type(),
                "message": self.to_string()
            }
        }));

        (self.status(), body).into_response()
    }
}

/// An [`Error`] rendered the way the v2 protocol prescribes: `{"error": "<message>"}`.
#[derive(Debug)]
pub struct V2Error(pub Error);

impl From<Error> for V2Error {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for V2Error {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.0.to_string() }));
        (self.0.status(), body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors raised while bringing the server up. None of these are
/// returned once listeners are accepting connections.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Deployment failed: {0}")]
    Deploy(#[from] DeployError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for StartupError {
    fn from(error: config::ConfigError) -> Self {
        StartupError::Configuration(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::InvalidInput("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::ModelNotFound("m".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::ModelNotReady("m".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::NotImplemented("explain".into()).status(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            Error::Inference("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_v1_error_body() {
        let response = Error::ModelNotFound("iris".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "model_not_found");
        assert_eq!(body["error"]["message"], "Model with name iris does not exist");
    }

    #[tokio::test]
    async fn test_v2_error_body() {
        let response = V2Error(Error::ModelNotReady("iris".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Model with name iris is not ready");
    }
}
