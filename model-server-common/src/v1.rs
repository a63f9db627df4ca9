//! v1 protocol envelopes.
//!
//! Predict and explain bodies are model-defined JSON objects, so only the
//! server-owned responses are typed here.

use serde::{Deserialize, Serialize};

/// Response from `GET /` - process liveness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveResponse {
    pub status: String,
}

impl LiveResponse {
    pub fn alive() -> Self {
        Self {
            status: "alive".to_string(),
        }
    }
}

/// Response from `GET /v1/models`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}

/// Response from `GET /v1/models/{name}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReadyResponse {
    pub name: String,
    pub ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_response_body() {
        let json = serde_json::to_string(&LiveResponse::alive()).unwrap();
        assert_eq!(json, r#"{"status":"alive"}"#);
    }

    #[test]
    fn test_models_response_serialization() {
        let response = ModelsResponse {
            models: vec!["iris".to_string(), "mnist".to_string()],
        };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"models":["iris","mnist"]}"#);
    }
}
