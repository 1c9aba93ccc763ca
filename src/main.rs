//! Wayfarer HTTP server entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;

use wayfarer::cache::Caches;
use wayfarer::config::Config;
use wayfarer::cost::CostTable;
use wayfarer::engine::{Engine, EngineSettings};
use wayfarer::gateway::{HandlerState, create_router_with_state};
use wayfarer::provider::GeminiProvider;
use wayfarer::repo::{Db, Repositories};
use wayfarer::semantic::HttpEmbedder;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    config.validate()?;
    let addr: SocketAddr = config.socket_addr().parse()?;

    tracing::info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        model = %config.model_name,
        "Wayfarer starting"
    );

    let db = Arc::new(Db::open(&config.database_path)?);
    let repos = Repositories::new(db);

    let caches = Caches::from_config(&config);
    let sweeper = caches.start_sweeper(Caches::sweep_interval(&config));

    let provider = Arc::new(GeminiProvider::new(
        config.provider_base_url.clone(),
        config.provider_api_key.clone(),
        config.model_name.clone(),
    ));
    let embedder = Arc::new(HttpEmbedder::new(
        config.provider_base_url.clone(),
        config.provider_api_key.clone(),
        config.embed_model_name.clone(),
    ));

    let engine = Engine::new(
        provider,
        embedder,
        caches.clone(),
        repos,
        CostTable::new(config.cost_table.clone()),
        EngineSettings::from_config(&config),
    );

    let state = HandlerState::new(engine, caches);
    let app = create_router_with_state(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("Wayfarer shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
