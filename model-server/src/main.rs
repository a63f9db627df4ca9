//! Model Server binary.

use std::env;
use std::sync::Arc;

use model_server::config::Config;
use model_server::logging::init_tracing;
use model_server::server::{shutdown_signal, ModelServer};
use model_server::ModelCatalog;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle --version / -V
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("model-server {}", VERSION);
        return Ok(());
    }

    let config = Config::load().map_err(|e| {
        format!(
            "Failed to load configuration: {}. \
             Check config.toml and MODEL_SERVER__* environment variables.",
            e
        )
    })?;

    init_tracing(&config.logging.level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers)
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        "Starting model-server {} with {} workers",
        VERSION,
        config.server.workers
    );

    let catalog = Arc::new(ModelCatalog::new(config.models.clone()));
    let models = catalog.initial_models(&config.actors);

    let server = ModelServer::new(config, catalog);
    server.start(models, shutdown_signal()).await?;

    Ok(())
}
