//! Remote actor runtime.
//!
//! Remote backends are hosted by actors: each deployment owns its model in a
//! dedicated task and serves requests arriving on its mailbox. Callers hold
//! a [`RemoteHandle`] and await replies without blocking their worker.
//!
//! The runtime also exposes a small administrative HTTP endpoint, separate
//! from the public serving ports, listing deployments and their readiness.

mod deployment;

pub use deployment::{Deployment, RemoteHandle};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use model_server_common::LiveResponse;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::backend::ReadyState;
use crate::config::ActorsConfig;

/// Errors from deploying or addressing actors.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("deployment {0} has not been deployed")]
    NotDeployed(String),

    #[error("actor runtime has been shut down")]
    RuntimeStopped,
}

struct DeploymentRecord {
    ready: ReadyState,
    deployed_at: DateTime<Utc>,
    task: JoinHandle<()>,
}

/// Deployment as reported by the admin endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentStatus {
    pub name: String,
    pub ready: bool,
    pub deployed_at: DateTime<Utc>,
}

/// Host for actor deployments.
pub struct ActorRuntime {
    deployments: RwLock<HashMap<String, DeploymentRecord>>,
    admin_addr: Option<SocketAddr>,
    stopped: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl ActorRuntime {
    /// Start the runtime and its admin endpoint.
    ///
    /// Starting is best-effort: when the admin address cannot be bound (for
    /// instance because another runtime already holds it) the runtime still
    /// hosts actors, just without the admin listener.
    pub async fn start(config: &ActorsConfig) -> Arc<Self> {
        let addr = format!("{}:{}", config.admin_host, config.admin_port);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => Some(listener),
            Err(e) => {
                tracing::warn!(
                    "Actor runtime admin endpoint unavailable on {}: {}. Continuing without it",
                    addr,
                    e
                );
                None
            }
        };
        let admin_addr = listener.as_ref().and_then(|l| l.local_addr().ok());

        let runtime = Arc::new(Self {
            deployments: RwLock::new(HashMap::new()),
            admin_addr,
            stopped: AtomicBool::new(false),
            shutdown_tx,
        });

        if let Some(listener) = listener {
            let app = admin_router(runtime.clone());
            let mut shutdown_rx = shutdown_rx;
            tokio::spawn(async move {
                let result = axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown_rx.wait_for(|stop| *stop).await;
                    })
                    .await;
                if let Err(e) = result {
                    tracing::error!("Actor runtime admin endpoint failed: {}", e);
                }
            });
            tracing::info!("Actor runtime admin endpoint listening on {}", addr);
        }

        runtime
    }

    /// Address the admin endpoint is bound to, if it could be bound.
    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop accepting deployments and close the admin endpoint.
    ///
    /// Running actors stop on their own once every handle to them is dropped.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(true);
    }

    /// Track a spawned actor. A redeployed name replaces its earlier record.
    async fn record(&self, name: &str, ready: ReadyState, task: JoinHandle<()>) {
        self.deployments.write().await.insert(
            name.to_string(),
            DeploymentRecord {
                ready,
                deployed_at: Utc::now(),
                task,
            },
        );
    }

    /// Snapshot of every running deployment, sorted by name. Actors that
    /// stopped (every handle dropped, e.g. after an unload) are forgotten.
    pub async fn deployments(&self) -> Vec<DeploymentStatus> {
        let mut deployments = self.deployments.write().await;
        deployments.retain(|name, record| {
            let running = !record.task.is_finished();
            if !running {
                tracing::debug!("Forgetting stopped actor {}", name);
            }
            running
        });

        let mut statuses: Vec<DeploymentStatus> = deployments
            .iter()
            .map(|(name, record)| DeploymentStatus {
                name: name.clone(),
                ready: record.ready.is_ready(),
                deployed_at: record.deployed_at,
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}

fn admin_router(runtime: Arc<ActorRuntime>) -> Router {
    Router::new()
        .route("/", get(|| async { Json(LiveResponse::alive()) }))
        .route("/deployments", get(list_deployments))
        .with_state(runtime)
}

/// GET /deployments - every deployment with its readiness.
async fn list_deployments(State(runtime): State<Arc<ActorRuntime>>) -> Json<Vec<DeploymentStatus>> {
    Json(runtime.deployments().await)
}
