//! Clients for the hosted model services: embeddings, cross-encoder reranking and
//! answer generation.

pub mod cross_encoder;
pub mod embeddings;
pub mod generate;

use std::time::Duration;

/// Pause before the single retry of a transient failure.
const RETRY_DELAY: Duration = Duration::from_millis(250);

/// Send a request, retrying once if the first attempt failed to connect or timed out.
///
/// Requests with streaming bodies cannot be cloned and are sent exactly once.
pub(crate) async fn send_with_retry(
    request: reqwest::RequestBuilder,
) -> reqwest::Result<reqwest::Response> {
    let Some(retry) = request.try_clone() else {
        return request.send().await;
    };

    match request.send().await {
        Err(e) if is_transient(&e) => {
            tracing::warn!("Transient HTTP failure, retrying once: {e}");
            tokio::time::sleep(RETRY_DELAY).await;
            retry.send().await
        }
        other => other,
    }
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

/// Read an error body for logging without failing on unreadable bodies.
pub(crate) async fn error_body(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    format!("{status}: {body}")
}
