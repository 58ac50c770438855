use std::env;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wpt_stub::{AppState, StubConfig};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wpt_stub=debug,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let port: u16 = env::var("STUB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);
    let config = StubConfig::from_env();
    info!(
        "config: cola={} corriendo={} inválido cada={:?} key={}",
        config.queue_depth,
        config.running_polls,
        config.invalid_every,
        if config.api_key.is_some() { "sí" } else { "no" }
    );

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("wpt-stub escuchando en {}", listener.local_addr()?);

    wpt_stub::serve(listener, AppState::new(config)).await
}
