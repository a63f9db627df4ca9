//! Model doubles for unit and integration tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::model::{Model, ModelError, ModelProvider};

/// Echoes `instances` back as `predictions`. No explainer.
pub struct EchoModel {
    name: String,
}

impl EchoModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Model for EchoModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict(&self, input: Value) -> Result<Value, ModelError> {
        let instances = input.get("instances").cloned().unwrap_or(Value::Null);
        Ok(json!({ "predictions": instances }))
    }
}

/// Panics on every call.
pub struct PanickingModel {
    name: String,
}

impl PanickingModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Model for PanickingModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict(&self, _input: Value) -> Result<Value, ModelError> {
        panic!("predict exploded");
    }
}

/// Fails every prediction with a fixed error.
pub struct FailingModel {
    name: String,
    invalid_input: bool,
}

impl FailingModel {
    pub fn inference(name: &str) -> Self {
        Self {
            name: name.to_string(),
            invalid_input: false,
        }
    }

    pub fn invalid_input(name: &str) -> Self {
        Self {
            name: name.to_string(),
            invalid_input: true,
        }
    }
}

#[async_trait]
impl Model for FailingModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict(&self, _input: Value) -> Result<Value, ModelError> {
        if self.invalid_input {
            Err(ModelError::InvalidInput("expected three features".to_string()))
        } else {
            Err(ModelError::Inference("weights are corrupt".to_string()))
        }
    }
}

/// Fails in `load`.
pub struct FailingLoadModel {
    name: String,
}

impl FailingLoadModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Model for FailingLoadModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<(), ModelError> {
        Err(ModelError::Inference("model file not found".to_string()))
    }

    async fn predict(&self, _input: Value) -> Result<Value, ModelError> {
        Err(ModelError::NotReady)
    }
}

/// Panics in `load`, otherwise behaves like [`EchoModel`].
pub struct PanickingLoadModel {
    inner: EchoModel,
}

impl PanickingLoadModel {
    pub fn new(name: &str) -> Self {
        Self {
            inner: EchoModel::new(name),
        }
    }
}

#[async_trait]
impl Model for PanickingLoadModel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn load(&self) -> Result<(), ModelError> {
        panic!("weights file is truncated");
    }

    async fn predict(&self, input: Value) -> Result<Value, ModelError> {
        self.inner.predict(input).await
    }
}

/// Sleeps before answering like [`EchoModel`].
pub struct SlowModel {
    inner: EchoModel,
    delay: Duration,
}

impl SlowModel {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            inner: EchoModel::new(name),
            delay,
        }
    }
}

#[async_trait]
impl Model for SlowModel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn predict(&self, input: Value) -> Result<Value, ModelError> {
        tokio::time::sleep(self.delay).await;
        self.inner.predict(input).await
    }
}

/// Echo model whose `load` blocks until the gate is opened.
pub struct GatedModel {
    inner: EchoModel,
    gate: Arc<Notify>,
}

impl GatedModel {
    pub fn new(name: &str) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        (
            Self {
                inner: EchoModel::new(name),
                gate: gate.clone(),
            },
            gate,
        )
    }
}

#[async_trait]
impl Model for GatedModel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn load(&self) -> Result<(), ModelError> {
        self.gate.notified().await;
        Ok(())
    }

    async fn predict(&self, input: Value) -> Result<Value, ModelError> {
        self.inner.predict(input).await
    }
}

/// Provider over a fixed set of models.
#[derive(Default)]
pub struct StaticProvider {
    models: HashMap<String, Arc<dyn Model>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_echo(self, name: &str) -> Self {
        self.with_model(Arc::new(EchoModel::new(name)))
    }

    pub fn with_model(mut self, model: Arc<dyn Model>) -> Self {
        self.models.insert(model.name().to_string(), model);
        self
    }
}

#[async_trait]
impl ModelProvider for StaticProvider {
    async fn resolve(&self, name: &str) -> Result<Option<Arc<dyn Model>>, ModelError> {
        Ok(self.models.get(name).cloned())
    }
}
