//! Liveness endpoint for hosts that expect the process to listen on a port.

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio_util::sync::CancellationToken;

pub const BANNER: &str = "Channel broadcast relay is running!";

pub fn router() -> Router {
    Router::new()
        .route("/", get(|| async { BANNER }))
        .route("/health", get(|| async { "OK" }))
}

/// Serve until `cancel` fires.
pub async fn serve(listener: tokio::net::TcpListener, cancel: CancellationToken) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "health server listening");
    axum::serve(listener, router())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

pub async fn bind(port: u16) -> anyhow::Result<tokio::net::TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    Ok(tokio::net::TcpListener::bind(addr).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_banner_and_health() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(listener, cancel.clone()));

        let client = reqwest::Client::new();
        let root = client
            .get(format!("http://{addr}/"))
            .send()
            .await
            .expect("GET /");
        assert!(root.status().is_success());
        assert_eq!(root.text().await.expect("body"), BANNER);

        let health = client
            .get(format!("http://{addr}/health"))
            .send()
            .await
            .expect("GET /health");
        assert_eq!(health.status().as_u16(), 200);

        let missing = client
            .get(format!("http://{addr}/nope"))
            .send()
            .await
            .expect("GET /nope");
        assert_eq!(missing.status().as_u16(), 404);

        cancel.cancel();
        server.await.expect("join").expect("serve");
    }
}
