use std::net::SocketAddr;

use server::{build_router, config::ServerConfig, AppState};
use synth_core::{EngineArgs, PipelineConfig};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting synthesis server...");

    let config = ServerConfig::from_env();
    let pipeline = PipelineConfig::from_env();

    let engine_args = match &config.engine_config {
        Some(path) => {
            info!("Loading engine configuration from {}", path.display());
            EngineArgs::from_file(path)?
        }
        None => {
            info!("ENGINE_CONFIG not set, using reference engine defaults");
            EngineArgs::default()
        }
    };

    let state = AppState::new(config.clone(), pipeline.clone(), engine_args)?;
    info!(
        "Server configuration loaded: port={}, sample_rate={}, policy={}, lookup={}, backup={}",
        config.port, state.sample_rate, pipeline.policy, pipeline.n_lookup, pipeline.n_backup
    );

    let worker = state.worker.clone();
    let app = build_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    worker.stop();
    Ok(())
}
