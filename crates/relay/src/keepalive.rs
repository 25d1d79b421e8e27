use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Ping `url` every `interval` so free-tier hosts don't idle the process out.
pub async fn run(url: String, interval: Duration, cancel: CancellationToken) {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "keep-alive disabled: http client init failed");
            return;
        }
    };

    let mut tick = tokio::time::interval(interval);
    // The first tick fires immediately; the process was just started.
    tick.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                match client.get(&url).send().await {
                    Ok(resp) => tracing::debug!(status = %resp.status(), "keep-alive ping"),
                    Err(e) => tracing::warn!(error = %e, url = %url, "keep-alive ping failed"),
                }
            }
        }
    }
}
