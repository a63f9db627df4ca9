//! Model registry mapping model names to backend handles.

use std::collections::HashMap;
use tokio::sync::RwLock;

use super::BackendHandle;

/// Registry of every model the server can dispatch to.
///
/// One registry is created at startup and shared by all listeners and
/// workers. The lock only ever guards single map operations; handles are
/// cloned out before any backend is invoked, so in-flight requests keep the
/// handle they resolved even if the name is re-registered meanwhile.
pub struct ModelRegistry {
    models: RwLock<HashMap<String, BackendHandle>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace the handle for `name`.
    ///
    /// A replaced remote handle is not torn down; its actor keeps running
    /// until every clone of the handle is dropped.
    pub async fn register(&self, name: &str, handle: BackendHandle) {
        let previous = self.models.write().await.insert(name.to_string(), handle);
        if previous.is_some() {
            tracing::info!("Replaced registration for model {}", name);
        } else {
            tracing::info!("Registered model {}", name);
        }
    }

    /// Remove `name`, returning whether it was registered.
    pub async fn unregister(&self, name: &str) -> bool {
        let removed = self.models.write().await.remove(name).is_some();
        if removed {
            tracing::info!("Unregistered model {}", name);
        }
        removed
    }

    /// Get the handle registered under `name`.
    pub async fn lookup(&self, name: &str) -> Option<BackendHandle> {
        self.models.read().await.get(name).cloned()
    }

    /// Snapshot of registered names, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every registered handle, sorted by name.
    pub async fn all(&self) -> Vec<BackendHandle> {
        let mut handles: Vec<BackendHandle> = self.models.read().await.values().cloned().collect();
        handles.sort_by(|a, b| a.name().cmp(b.name()));
        handles
    }

    /// Whether `name` is registered and ready; `None` when unregistered.
    pub async fn is_ready(&self, name: &str) -> Option<bool> {
        self.models.read().await.get(name).map(BackendHandle::is_ready)
    }

    pub async fn count(&self) -> usize {
        self.models.read().await.len()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
