use annotation_server::{router, AppState, ServerConfig};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("annotation_server=debug,store=debug,tower_http=info")),
        )
        .init();

    let config = ServerConfig::parse();
    let addr = config.addr();

    info!("Starting annotation server...");
    let state = AppState::open(config)?;
    info!(
        "Loaded {} tasks, videos from {}",
        state.catalog.len(),
        state.config.video_dir.display()
    );

    let app = router(state);

    info!("Annotation server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
