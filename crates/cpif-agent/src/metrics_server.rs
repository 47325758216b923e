use axum::{routing::get, Router};
use std::net::SocketAddr;
use tracing::info;

/// Metrics router
pub fn create_router() -> Router {
    Router::new().route("/metrics", get(metrics))
}

async fn metrics() -> String {
    cpif_metrics::gather_metrics()
}

/// Serve `/metrics` on all interfaces
pub async fn serve(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Serving metrics on {}", addr);
    axum::serve(listener, create_router()).await
}
