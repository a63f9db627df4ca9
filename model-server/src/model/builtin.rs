//! Built-in models and the configuration-backed model catalog.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use model_server_common::{DataType, ModelMetadata, TensorMetadata};
use serde_json::{json, Value};

use super::{Model, ModelError, ModelProvider};
use crate::actor::Deployment;
use crate::config::{ActorsConfig, ModelEntry, ModelKind, Placement};
use crate::server::ModelDefinition;

fn instances(input: &Value) -> Result<&Vec<Value>, ModelError> {
    input
        .get("instances")
        .and_then(Value::as_array)
        .ok_or_else(|| ModelError::InvalidInput("expected an \"instances\" array".to_string()))
}

/// Returns its instances unchanged as predictions.
pub struct IdentityModel {
    name: String,
}

impl IdentityModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Model for IdentityModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict(&self, input: Value) -> Result<Value, ModelError> {
        let rows = instances(&input)?;
        Ok(json!({ "predictions": rows }))
    }
}

/// Sums every numeric instance row. Explanations attribute the sum to each
/// feature, which for a sum is the feature value itself.
pub struct SumModel {
    name: String,
}

impl SumModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn rows(input: &Value) -> Result<Vec<Vec<f64>>, ModelError> {
        instances(input)?
            .iter()
            .map(|row| {
                let features = match row {
                    Value::Array(items) => items.as_slice(),
                    single => std::slice::from_ref(single),
                };
                features
                    .iter()
                    .map(|v| {
                        v.as_f64().ok_or_else(|| {
                            ModelError::InvalidInput(format!("non-numeric feature {}", v))
                        })
                    })
                    .collect()
            })
            .collect()
    }
}

#[async_trait]
impl Model for SumModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            name: self.name.clone(),
            versions: vec![],
            platform: "builtin".to_string(),
            inputs: vec![TensorMetadata {
                name: "input-0".to_string(),
                datatype: DataType::Fp64,
                shape: vec![-1, -1],
            }],
            outputs: vec![TensorMetadata {
                name: "predictions".to_string(),
                datatype: DataType::Fp64,
                shape: vec![-1],
            }],
        }
    }

    async fn predict(&self, input: Value) -> Result<Value, ModelError> {
        let sums: Vec<f64> = Self::rows(&input)?
            .iter()
            .map(|row| row.iter().sum())
            .collect();
        Ok(json!({ "predictions": sums }))
    }

    async fn explain(&self, input: Value) -> Result<Value, ModelError> {
        let rows = Self::rows(&input)?;
        Ok(json!({ "explanations": rows }))
    }
}

impl ModelKind {
    /// Construct a fresh model of this kind.
    pub fn build(&self, name: &str) -> Arc<dyn Model> {
        match self {
            ModelKind::Identity => Arc::new(IdentityModel::new(name)),
            ModelKind::Sum => Arc::new(SumModel::new(name)),
        }
    }
}

/// Model definitions taken from the `models` configuration section.
pub struct ModelCatalog {
    entries: HashMap<String, ModelEntry>,
}

impl ModelCatalog {
    pub fn new(entries: Vec<ModelEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.name.clone(), e)).collect(),
        }
    }

    /// The collection served at startup: every entry marked `autoload`.
    ///
    /// The result is not checked for homogeneity here; the server rejects
    /// collections mixing local and remote entries.
    pub fn initial_models(&self, actors: &ActorsConfig) -> Vec<ModelDefinition> {
        let mut autoload: Vec<&ModelEntry> = self.entries.values().filter(|e| e.autoload).collect();
        autoload.sort_by(|a, b| a.name.cmp(&b.name));

        autoload
            .into_iter()
            .map(|entry| {
                let model = entry.kind.build(&entry.name);
                match entry.backend {
                    Placement::Local => ModelDefinition::Local(model),
                    Placement::Remote => ModelDefinition::Remote(
                        Deployment::new(&entry.name, model)
                            .with_mailbox_capacity(actors.mailbox_capacity),
                    ),
                }
            })
            .collect()
    }
}

#[async_trait]
impl ModelProvider for ModelCatalog {
    async fn resolve(&self, name: &str) -> Result<Option<Arc<dyn Model>>, ModelError> {
        Ok(self.entries.get(name).map(|entry| entry.kind.build(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, kind: ModelKind, backend: Placement, autoload: bool) -> ModelEntry {
        ModelEntry {
            name: name.to_string(),
            kind,
            backend,
            autoload,
        }
    }

    #[tokio::test]
    async fn test_identity_echoes_instances() {
        let model = IdentityModel::new("echo");
        let output = model
            .predict(json!({ "instances": [[1, 2], [3, 4]] }))
            .await
            .unwrap();
        assert_eq!(output, json!({ "predictions": [[1, 2], [3, 4]] }));
    }

    #[tokio::test]
    async fn test_identity_requires_instances() {
        let model = IdentityModel::new("echo");
        let err = model.predict(json!({ "rows": [] })).await.unwrap_err();
        assert!(matches!(err, ModelError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_identity_has_no_explainer() {
        let model = IdentityModel::new("echo");
        let err = model.explain(json!({ "instances": [] })).await.unwrap_err();
        assert!(matches!(err, ModelError::NotImplemented(_)));
    }

    #[tokio::test]
    async fn test_sum_predict_and_explain() {
        let model = SumModel::new("adder");
        let input = json!({ "instances": [[1.0, 2.0, 3.0], [0.5, 0.5]] });

        let output = model.predict(input.clone()).await.unwrap();
        assert_eq!(output, json!({ "predictions": [6.0, 1.0] }));

        let explanation = model.explain(input).await.unwrap();
        assert_eq!(
            explanation,
            json!({ "explanations": [[1.0, 2.0, 3.0], [0.5, 0.5]] })
        );
    }

    #[tokio::test]
    async fn test_sum_rejects_strings() {
        let model = SumModel::new("adder");
        let err = model
            .predict(json!({ "instances": [["a"]] }))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_catalog_resolves_known_names_only() {
        let catalog = ModelCatalog::new(vec![entry(
            "adder",
            ModelKind::Sum,
            Placement::Local,
            false,
        )]);

        let model = catalog.resolve("adder").await.unwrap().unwrap();
        assert_eq!(model.name(), "adder");
        assert!(catalog.resolve("missing").await.unwrap().is_none());
    }

    #[test]
    fn test_initial_models_respects_autoload_and_placement() {
        let catalog = ModelCatalog::new(vec![
            entry("b-remote", ModelKind::Identity, Placement::Remote, true),
            entry("a-local", ModelKind::Sum, Placement::Local, true),
            entry("lazy", ModelKind::Sum, Placement::Local, false),
        ]);

        let models = catalog.initial_models(&ActorsConfig::default());
        assert_eq!(models.len(), 2);
        assert!(matches!(&models[0], ModelDefinition::Local(m) if m.name() == "a-local"));
        assert!(matches!(&models[1], ModelDefinition::Remote(d) if d.name() == "b-remote"));
    }
}
