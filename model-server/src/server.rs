//! Server orchestration: validate the initial models, populate the
//! registry, build the route table and run the listeners until shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::actor::{ActorRuntime, Deployment};
use crate::api;
use crate::backend::{BackendHandle, ModelRegistry, ReadyState};
use crate::config::{Config, Placement};
use crate::error::StartupError;
use crate::model::{Model, ModelProvider};
use crate::state::AppState;

/// One element of the initial model collection.
pub enum ModelDefinition {
    /// Served in-process.
    Local(Arc<dyn Model>),
    /// Served by an actor of the remote runtime.
    Remote(Deployment),
}

impl ModelDefinition {
    pub fn name(&self) -> &str {
        match self {
            ModelDefinition::Local(model) => model.name(),
            ModelDefinition::Remote(deployment) => deployment.name(),
        }
    }

    pub fn placement(&self) -> Placement {
        match self {
            ModelDefinition::Local(_) => Placement::Local,
            ModelDefinition::Remote(_) => Placement::Remote,
        }
    }
}

/// Reject collections that mix local and remote definitions or carry an
/// empty name. Runs before anything is registered.
pub fn validate_models(models: &[ModelDefinition]) -> Result<Option<Placement>, StartupError> {
    let mut placement = None;
    for model in models {
        if model.name().is_empty() {
            return Err(StartupError::Configuration(
                "model definitions must have a non-empty name".to_string(),
            ));
        }
        match placement {
            None => placement = Some(model.placement()),
            Some(p) if p != model.placement() => {
                return Err(StartupError::Configuration(format!(
                    "initial models must be all local or all remote, '{}' is {:?} but earlier models are {:?}",
                    model.name(),
                    model.placement(),
                    p
                )));
            }
            Some(_) => {}
        }
    }
    Ok(placement)
}

/// Owns the registry for the lifetime of the process.
pub struct ModelServer {
    config: Config,
    registry: Arc<ModelRegistry>,
    provider: Arc<dyn ModelProvider>,
}

impl ModelServer {
    pub fn new(config: Config, provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            config,
            registry: Arc::new(ModelRegistry::new()),
            provider,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Validate and register the initial collection.
    ///
    /// Local models are registered not ready and loaded in the background.
    /// A remote collection starts the actor runtime, which is returned so
    /// the caller can stop it on shutdown.
    pub async fn populate(
        &self,
        models: Vec<ModelDefinition>,
    ) -> Result<Option<Arc<ActorRuntime>>, StartupError> {
        let placement = validate_models(&models)?;
        let latency_logging = self.config.server.enable_latency_logging;

        let runtime = match placement {
            Some(Placement::Remote) => Some(ActorRuntime::start(&self.config.actors).await),
            _ => None,
        };

        for definition in models {
            match definition {
                ModelDefinition::Local(model) => {
                    let name = model.name().to_string();
                    let ready = ReadyState::new(false);
                    let handle = BackendHandle::local(model.clone(), latency_logging, ready.clone());
                    self.registry.register(&name, handle).await;
                    tokio::spawn(load_local(name, model, ready));
                }
                ModelDefinition::Remote(mut deployment) => {
                    let Some(runtime) = runtime.as_ref() else {
                        continue;
                    };
                    deployment.deploy(runtime).await?;
                    let handle = deployment.get_handle()?;
                    self.registry
                        .register(deployment.name(), BackendHandle::remote(deployment.name(), handle))
                        .await;
                }
            }
        }

        tracing::info!("Registered {} initial models", self.registry.count().await);
        Ok(runtime)
    }

    fn state(&self) -> Arc<AppState> {
        Arc::new(AppState::new(
            self.registry.clone(),
            self.provider.clone(),
            Duration::from_secs(self.config.actors.call_timeout_secs),
            self.config.server.enable_latency_logging,
        ))
    }

    /// Full route table bound to this server's registry.
    pub fn router(&self) -> Router {
        api::router(self.state(), self.config.server.max_request_body_bytes)
    }

    /// Populate the registry, start the listeners and serve until `shutdown`
    /// resolves, then drain for at most the configured grace period.
    pub async fn start<F>(self, models: Vec<ModelDefinition>, shutdown: F) -> Result<(), StartupError>
    where
        F: Future<Output = ()> + Send,
    {
        let runtime = self.populate(models).await?;
        let state = self.state();
        let server = &self.config.server;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut listeners = JoinSet::new();

        let primary = format!("{}:{}", server.host, server.http_port);
        let listener = TcpListener::bind(&primary).await?;
        tracing::info!("Listening on {}", primary);
        listeners.spawn(serve(
            listener,
            api::router(state.clone(), server.max_request_body_bytes),
            shutdown_rx.clone(),
        ));

        if server.enable_secondary {
            let secondary = format!("{}:{}", server.host, server.grpc_port);
            let listener = TcpListener::bind(&secondary).await?;
            tracing::info!("Secondary v2 listener on {}", secondary);
            listeners.spawn(serve(
                listener,
                api::v2_router(state, server.max_request_body_bytes),
                shutdown_rx,
            ));
        }

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown requested, draining listeners");
            }
            Some(result) = listeners.join_next() => {
                tracing::error!("Listener exited unexpectedly: {:?}", result);
            }
        }
        let _ = shutdown_tx.send(true);

        let grace = Duration::from_secs(server.shutdown_grace_secs);
        let drain = async {
            while let Some(result) = listeners.join_next().await {
                if let Ok(Err(e)) = result {
                    tracing::error!("Listener failed: {}", e);
                }
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            tracing::warn!("In-flight requests still running after {:?}, aborting", grace);
            listeners.abort_all();
        }

        if let Some(runtime) = runtime {
            runtime.shutdown();
        }
        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn load_local(name: String, model: Arc<dyn Model>, ready: ReadyState) {
    match model.load().await {
        Ok(()) => {
            ready.set_ready(true);
            tracing::info!("Model {} ready", name);
        }
        Err(e) => tracing::error!("Failed to load model {}: {}", name, e),
    }
}

async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActorsConfig;
    use crate::test_util::{EchoModel, FailingLoadModel, GatedModel, StaticProvider};

    fn server() -> ModelServer {
        let mut config = Config::default();
        config.actors = ActorsConfig {
            admin_host: "127.0.0.1".to_string(),
            admin_port: 0,
            ..Default::default()
        };
        ModelServer::new(config, Arc::new(StaticProvider::new()))
    }

    fn local(model: impl Model + 'static) -> ModelDefinition {
        ModelDefinition::Local(Arc::new(model))
    }

    fn remote(name: &str) -> ModelDefinition {
        ModelDefinition::Remote(Deployment::new(name, Arc::new(EchoModel::new(name))))
    }

    async fn wait_ready(registry: &ModelRegistry, name: &str) {
        for _ in 0..100 {
            if registry.is_ready(name).await == Some(true) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} never became ready", name);
    }

    #[tokio::test]
    async fn test_mixed_collection_is_rejected_before_registration() {
        let server = server();
        let result = server
            .populate(vec![local(EchoModel::new("a")), remote("b")])
            .await;

        assert!(matches!(result, Err(StartupError::Configuration(_))));
        assert_eq!(server.registry().count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected() {
        let server = server();
        let result = server.populate(vec![local(EchoModel::new(""))]).await;
        assert!(matches!(result, Err(StartupError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_empty_collection_starts_no_runtime() {
        let server = server();
        let runtime = server.populate(vec![]).await.unwrap();
        assert!(runtime.is_none());
    }

    #[tokio::test]
    async fn test_local_models_become_ready_asynchronously() {
        let server = server();
        let (gated, gate) = GatedModel::new("gated");
        server.populate(vec![local(gated)]).await.unwrap();

        assert_eq!(server.registry().is_ready("gated").await, Some(false));

        gate.notify_one();
        wait_ready(server.registry(), "gated").await;
    }

    #[tokio::test]
    async fn test_failed_local_load_stays_not_ready() {
        let server = server();
        server
            .populate(vec![local(FailingLoadModel::new("broken"))])
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.registry().is_ready("broken").await, Some(false));
    }

    #[tokio::test]
    async fn test_remote_collection_deploys_actors() {
        let server = server();
        let runtime = server
            .populate(vec![remote("r1"), remote("r2")])
            .await
            .unwrap()
            .unwrap();

        let handle = server.registry().lookup("r1").await.unwrap();
        assert_eq!(handle.backend_type(), crate::backend::BackendType::Remote);
        wait_ready(server.registry(), "r2").await;
        assert_eq!(runtime.deployments().await.len(), 2);
        runtime.shutdown();
    }

    #[tokio::test]
    async fn test_start_stops_on_shutdown() {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.http_port = 0;
        config.server.shutdown_grace_secs = 1;
        let server = ModelServer::new(config, Arc::new(StaticProvider::new()));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            server.start(vec![local(EchoModel::new("echo"))], async {}),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
