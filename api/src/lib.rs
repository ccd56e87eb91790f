//! HTTP transport for the Meilisearch MCP server.
//!
//! Clients POST JSON-RPC messages and may hold open a server-sent-event
//! stream. Responses for methods that do not reply inline are fanned out to
//! every open stream.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod subscribers;

use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpListener;

pub use error::ServeError;
pub use state::{AppState, HttpSettings};
pub use subscribers::{SubscriberSet, Subscription};

pub async fn bind(host: &str, port: u16) -> Result<TcpListener, ServeError> {
    let ip: IpAddr = host.trim().parse().map_err(|_| ServeError::Bind {
        addr: format!("{host}:{port}"),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("'{host}' is not an IP address"),
        ),
    })?;
    let addr = SocketAddr::new(ip, port);
    TcpListener::bind(addr).await.map_err(|source| ServeError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Serves until the state's shutdown token is cancelled. Open event streams
/// end on the same token, so graceful shutdown does not wait on them.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), ServeError> {
    let shutdown = state.shutdown.clone();
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(event = "http_listening", %addr, "MCP HTTP transport listening");
    }

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!(event = "http_stopped", "MCP HTTP transport stopped");
    Ok(())
}
