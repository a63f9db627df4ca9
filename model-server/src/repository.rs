//! Model repository extension: load and unload models at runtime.

use std::sync::Arc;

use model_server_common::{LoadResponse, ModelState, RepositoryIndexEntry, UnloadResponse};

use crate::backend::{BackendHandle, ModelRegistry, ReadyState};
use crate::error::{Error, Result};
use crate::model::ModelProvider;

/// Administrative operations on the shared registry.
pub struct RepositoryExtension {
    registry: Arc<ModelRegistry>,
    provider: Arc<dyn ModelProvider>,
    latency_logging: bool,
}

impl RepositoryExtension {
    pub fn new(
        registry: Arc<ModelRegistry>,
        provider: Arc<dyn ModelProvider>,
        latency_logging: bool,
    ) -> Self {
        Self {
            registry,
            provider,
            latency_logging,
        }
    }

    /// Resolve, load and register `name`.
    ///
    /// Loading an already registered name replaces it with a fresh instance.
    /// Nothing is registered when the definition is unknown or its load fails.
    pub async fn load(&self, name: &str) -> Result<LoadResponse> {
        let model = self
            .provider
            .resolve(name)
            .await
            .map_err(|e| Error::ModelNotReady(format!("{} ({})", name, e)))?
            .ok_or_else(|| Error::ModelNotFound(name.to_string()))?;

        if let Err(e) = model.load().await {
            tracing::error!("Failed to load model {}: {}", name, e);
            return Err(Error::ModelNotReady(format!("{} ({})", name, e)));
        }

        let handle = BackendHandle::local(model, self.latency_logging, ReadyState::new(true));
        self.registry.register(name, handle).await;

        Ok(LoadResponse {
            name: name.to_string(),
            load: true,
        })
    }

    /// Remove `name` from the registry. Unloading an absent name is reported,
    /// so a double unload is visible to the caller.
    pub async fn unload(&self, name: &str) -> Result<UnloadResponse> {
        if !self.registry.unregister(name).await {
            return Err(Error::ModelNotFound(name.to_string()));
        }

        Ok(UnloadResponse {
            name: name.to_string(),
            unload: true,
        })
    }

    /// Every registered model with its serving state.
    pub async fn index(&self) -> Vec<RepositoryIndexEntry> {
        self.registry
            .all()
            .await
            .into_iter()
            .map(|handle| RepositoryIndexEntry {
                name: handle.name().to_string(),
                state: ModelState::from_ready(handle.is_ready()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{FailingLoadModel, StaticProvider};

    fn extension() -> (Arc<ModelRegistry>, RepositoryExtension) {
        let registry = Arc::new(ModelRegistry::new());
        let provider = StaticProvider::new()
            .with_echo("echo")
            .with_model(Arc::new(FailingLoadModel::new("broken")));
        let extension = RepositoryExtension::new(registry.clone(), Arc::new(provider), true);
        (registry, extension)
    }

    #[tokio::test]
    async fn test_load_registers_ready_handle() {
        let (registry, extension) = extension();

        let response = extension.load("echo").await.unwrap();
        assert_eq!(response, LoadResponse { name: "echo".to_string(), load: true });

        let handle = registry.lookup("echo").await.unwrap();
        assert!(handle.is_ready());
        assert!(handle.latency_logging());
    }

    #[tokio::test]
    async fn test_load_twice_replaces() {
        let (registry, extension) = extension();
        extension.load("echo").await.unwrap();
        let first = registry.lookup("echo").await.unwrap();

        extension.load("echo").await.unwrap();
        let second = registry.lookup("echo").await.unwrap();

        assert!(!first.same_backend(&second));
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_load_unknown_model() {
        let (registry, extension) = extension();
        assert!(matches!(
            extension.load("nope").await,
            Err(Error::ModelNotFound(_))
        ));
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_load_registers_nothing() {
        let (registry, extension) = extension();
        assert!(matches!(
            extension.load("broken").await,
            Err(Error::ModelNotReady(_))
        ));
        assert!(registry.lookup("broken").await.is_none());
    }

    #[tokio::test]
    async fn test_unload_reports_double_unload() {
        let (_, extension) = extension();
        extension.load("echo").await.unwrap();

        let response = extension.unload("echo").await.unwrap();
        assert!(response.unload);
        assert!(matches!(
            extension.unload("echo").await,
            Err(Error::ModelNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_index_lists_states() {
        let (registry, extension) = extension();
        extension.load("echo").await.unwrap();
        registry
            .register(
                "warming",
                BackendHandle::local(
                    Arc::new(crate::test_util::EchoModel::new("warming")),
                    false,
                    ReadyState::new(false),
                ),
            )
            .await;

        let index = extension.index().await;
        assert_eq!(index.len(), 2);
        assert_eq!(index[0].name, "echo");
        assert_eq!(index[0].state, ModelState::Ready);
        assert_eq!(index[1].state, ModelState::Unavailable);
    }
}
