//! Servicio local que imita la API de WebPageTest que usa el collector:
//! runtest.php, jsonResult.php y getgzip.php.

pub mod handlers;
pub mod state;

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

pub use handlers::build_router;
pub use state::{AppState, StubConfig};

/// Sirve el stub en el listener dado hasta que se corte.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, build_router(state)).await
}

/// Levanta el stub en un puerto libre de 127.0.0.1 y devuelve la dirección.
pub async fn spawn_local(config: StubConfig) -> std::io::Result<SocketAddr> {
    spawn_with_state(AppState::new(config)).await
}

/// Igual que [`spawn_local`], pero con un estado que el llamador puede seguir
/// inspeccionando.
pub async fn spawn_with_state(state: AppState) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = serve(listener, state).await {
            tracing::error!("stub en {} terminó con error: {}", addr, e);
        }
    });

    info!("wpt-stub escuchando en {}", addr);
    Ok(addr)
}
