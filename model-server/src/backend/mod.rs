//! Backend handles: the executable unit registered under a model name.
//!
//! A handle is either a local model called in the serving task or a remote
//! actor reached through its mailbox. Both are invoked through
//! [`BackendHandle::invoke`], so call sites never inspect the variant.

mod registry;

pub use registry::ModelRegistry;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use model_server_common::ModelMetadata;
use serde_json::Value;

use crate::actor::RemoteHandle;
use crate::model::{call_model, Model, ModelCall, ModelError};

/// Shared readiness flag. Cloning shares the flag, so whoever loads the
/// backend can flip it after the handle has been published.
#[derive(Debug, Clone, Default)]
pub struct ReadyState(Arc<AtomicBool>);

impl ReadyState {
    pub fn new(ready: bool) -> Self {
        Self(Arc::new(AtomicBool::new(ready)))
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set_ready(&self, ready: bool) {
        self.0.store(ready, Ordering::Release);
    }
}

/// Which execution strategy a handle uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Local,
    Remote,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Local => write!(f, "local"),
            BackendType::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Clone)]
enum BackendKind {
    Local {
        model: Arc<dyn Model>,
        latency_logging: bool,
    },
    Remote(RemoteHandle),
}

/// A registered model. Cheap to clone; the kind never changes after
/// construction, only the ready state does.
#[derive(Clone)]
pub struct BackendHandle {
    name: Arc<str>,
    kind: BackendKind,
    ready: ReadyState,
}

impl BackendHandle {
    /// Wrap an in-process model.
    pub fn local(model: Arc<dyn Model>, latency_logging: bool, ready: ReadyState) -> Self {
        Self {
            name: Arc::from(model.name()),
            kind: BackendKind::Local {
                model,
                latency_logging,
            },
            ready,
        }
    }

    /// Wrap an actor handle. Readiness is owned by the actor.
    pub fn remote(name: &str, handle: RemoteHandle) -> Self {
        let ready = handle.ready_state();
        Self {
            name: Arc::from(name),
            kind: BackendKind::Remote(handle),
            ready,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend_type(&self) -> BackendType {
        match self.kind {
            BackendKind::Local { .. } => BackendType::Local,
            BackendKind::Remote(_) => BackendType::Remote,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_ready()
    }

    pub fn ready_state(&self) -> &ReadyState {
        &self.ready
    }

    pub fn latency_logging(&self) -> bool {
        matches!(
            self.kind,
            BackendKind::Local {
                latency_logging: true,
                ..
            }
        )
    }

    pub fn metadata(&self) -> ModelMetadata {
        match &self.kind {
            BackendKind::Local { model, .. } => model.metadata(),
            BackendKind::Remote(handle) => handle.metadata().clone(),
        }
    }

    /// Whether two handles refer to the same registered backend.
    pub fn same_backend(&self, other: &BackendHandle) -> bool {
        Arc::ptr_eq(&self.ready.0, &other.ready.0)
    }

    /// Execute one call against the backend.
    ///
    /// `timeout` bounds remote calls only; local calls run to completion in
    /// the calling task. A panic inside a local model becomes
    /// [`ModelError::Unknown`].
    pub async fn invoke(
        &self,
        call: ModelCall,
        input: Value,
        timeout: Duration,
    ) -> Result<Value, ModelError> {
        match &self.kind {
            BackendKind::Local {
                model,
                latency_logging,
            } => {
                let start = Instant::now();
                let result = AssertUnwindSafe(call_model(model.as_ref(), call, input))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(ModelError::Unknown(panic_message(&*panic))));

                if *latency_logging {
                    tracing::info!(
                        model = %self.name,
                        operation = %call,
                        latency_ms = start.elapsed().as_secs_f64() * 1000.0,
                        success = result.is_ok(),
                        "model latency"
                    );
                }
                result
            }
            BackendKind::Remote(handle) => handle.call(call, input, timeout).await,
        }
    }
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle")
            .field("name", &self.name)
            .field("type", &self.backend_type())
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("model panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("model panicked: {}", message)
    } else {
        "model panicked".to_string()
    }
}
