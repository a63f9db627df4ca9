//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::ModelRegistry;
use crate::dispatch::Dispatcher;
use crate::model::ModelProvider;
use crate::repository::RepositoryExtension;

/// Shared application state passed to all handlers.
///
/// The dispatcher and the repository extension hold the same registry, so a
/// load or unload is visible to every listener and worker.
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub repository: RepositoryExtension,
}

impl AppState {
    pub fn new(
        registry: Arc<ModelRegistry>,
        provider: Arc<dyn ModelProvider>,
        call_timeout: Duration,
        latency_logging: bool,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(registry.clone(), call_timeout),
            repository: RepositoryExtension::new(registry, provider, latency_logging),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.dispatcher.registry()
    }
}
