//! Actor deployments and the handles used to call them.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use model_server_common::ModelMetadata;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::{ActorRuntime, DeployError};
use crate::backend::{panic_message, ReadyState};
use crate::model::{call_model, Model, ModelCall, ModelError};

const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// A request delivered to an actor's mailbox.
struct ActorEnvelope {
    request_id: Uuid,
    call: ModelCall,
    input: Value,
    reply: oneshot::Sender<Result<Value, ModelError>>,
}

/// Descriptor of a model to host behind an actor.
pub struct Deployment {
    name: String,
    model: Arc<dyn Model>,
    mailbox_capacity: usize,
    handle: Option<RemoteHandle>,
}

impl Deployment {
    pub fn new(name: &str, model: Arc<dyn Model>) -> Self {
        Self {
            name: name.to_string(),
            model,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            handle: None,
        }
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_deployed(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the actor on `runtime`.
    ///
    /// The actor loads its model before serving; its handle reports not
    /// ready until loading succeeds. Deploying again starts a fresh actor;
    /// handles to the previous one keep working until dropped.
    pub async fn deploy(&mut self, runtime: &ActorRuntime) -> Result<(), DeployError> {
        if runtime.is_stopped() {
            return Err(DeployError::RuntimeStopped);
        }

        let (tx, rx) = mpsc::channel(self.mailbox_capacity);
        let ready = ReadyState::new(false);

        let task = tokio::spawn(run_actor(
            self.name.clone(),
            self.model.clone(),
            ready.clone(),
            rx,
        ));
        runtime.record(&self.name, ready.clone(), task).await;

        self.handle = Some(RemoteHandle {
            name: Arc::from(self.name.as_str()),
            mailbox: tx,
            ready,
            metadata: Arc::new(self.model.metadata()),
        });
        tracing::info!("Deployed actor {}", self.name);
        Ok(())
    }

    /// Handle to the deployed actor.
    pub fn get_handle(&self) -> Result<RemoteHandle, DeployError> {
        self.handle
            .clone()
            .ok_or_else(|| DeployError::NotDeployed(self.name.clone()))
    }
}

/// Handle to a running actor.
#[derive(Clone)]
pub struct RemoteHandle {
    name: Arc<str>,
    mailbox: mpsc::Sender<ActorEnvelope>,
    ready: ReadyState,
    metadata: Arc<ModelMetadata>,
}

impl RemoteHandle {
    pub fn ready_state(&self) -> ReadyState {
        self.ready.clone()
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Send one call to the actor and wait for its reply.
    ///
    /// Both queueing and execution count against `timeout`. The caller's task
    /// is suspended, not blocked, while waiting.
    pub async fn call(
        &self,
        call: ModelCall,
        input: Value,
        timeout: Duration,
    ) -> Result<Value, ModelError> {
        let request_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = ActorEnvelope {
            request_id,
            call,
            input,
            reply: reply_tx,
        };

        let exchange = async {
            if self.mailbox.send(envelope).await.is_err() {
                return Err(ModelError::Unavailable(format!(
                    "actor {} has stopped",
                    self.name
                )));
            }
            match reply_rx.await {
                Ok(result) => result,
                Err(_) => Err(ModelError::Unavailable(format!(
                    "actor {} dropped request {}",
                    self.name, request_id
                ))),
            }
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    model = %self.name,
                    request_id = %request_id,
                    "Remote {} timed out after {:?}",
                    call,
                    timeout
                );
                Err(ModelError::Timeout(timeout))
            }
        }
    }
}

/// Actor body: load the model, then serve the mailbox one request at a time.
async fn run_actor(
    name: String,
    model: Arc<dyn Model>,
    ready: ReadyState,
    mut mailbox: mpsc::Receiver<ActorEnvelope>,
) {
    let loaded = AssertUnwindSafe(model.load())
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(ModelError::Unknown(panic_message(&*panic))));
    match loaded {
        Ok(()) => {
            ready.set_ready(true);
            tracing::info!("Actor {} ready", name);
        }
        Err(e) => {
            tracing::error!("Actor {} failed to load its model: {}", name, e);
        }
    }

    while let Some(envelope) = mailbox.recv().await {
        let ActorEnvelope {
            request_id,
            call,
            input,
            reply,
        } = envelope;

        tracing::debug!(model = %name, request_id = %request_id, "Actor handling {}", call);
        let result = AssertUnwindSafe(call_model(model.as_ref(), call, input))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ModelError::Unknown(panic_message(&*panic))));

        if reply.send(result).is_err() {
            tracing::debug!(
                model = %name,
                request_id = %request_id,
                "Caller went away before the reply"
            );
        }
    }

    tracing::info!("Actor {} stopped", name);
}
