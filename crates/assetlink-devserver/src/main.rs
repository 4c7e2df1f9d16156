use assetlink_devserver::{serve, AppState, DevServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("assetlink_devserver=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = DevServerConfig::from_env()?;
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        assets = config.assets.len(),
        "assetlink dev server listening"
    );

    serve(listener, AppState::new(&config)).await?;
    Ok(())
}
