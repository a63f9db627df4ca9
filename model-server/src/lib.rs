//! Model Server - a model registry with v1/v2 inference endpoints over
//! local and actor-hosted backends.

pub mod actor;
pub mod api;
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod model;
pub mod repository;
pub mod server;
pub mod state;
pub mod test_util;

pub use backend::{BackendHandle, BackendType, ModelRegistry, ReadyState};
pub use config::Config;
pub use error::{Error, StartupError};
pub use model::{Model, ModelCatalog, ModelError, ModelProvider};
pub use server::{ModelDefinition, ModelServer};
pub use state::AppState;
