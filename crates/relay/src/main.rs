use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use relay_core::config::Config;

mod health;
mod keepalive;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    relay_core::logging::init("relay")?;

    let cfg = Arc::new(Config::load()?);
    let cancel = CancellationToken::new();

    let health_task = if cfg.health_enabled {
        let listener = health::bind(cfg.health_port).await?;
        let cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = health::serve(listener, cancel).await {
                tracing::error!(error = %e, "health server failed");
            }
        }))
    } else {
        None
    };

    if let Some(url) = cfg.keepalive_url.clone() {
        tracing::info!(url = %url, interval_secs = cfg.keepalive_interval.as_secs(), "keep-alive enabled");
        tokio::spawn(keepalive::run(url, cfg.keepalive_interval, cancel.clone()));
    }

    let result = relay_telegram::router::run_polling(cfg).await;

    cancel.cancel();
    if let Some(task) = health_task {
        let _ = task.await;
    }

    result.map_err(|e| anyhow::anyhow!("telegram bot failed: {e}"))
}
