use anyhow::Result;
use reqwest::{Client, Response};
use std::time::Duration;

/// Upper bound on how much of an error response body is kept for logging.
pub const MAX_ERROR_BODY_BYTES: usize = 4 * 1024;

/// Build a `reqwest::Client` whose requests never outlive `timeout`.
///
/// Connect timeout is capped at the overall timeout. Falls back to the
/// default client if the builder fails.
pub fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Read a response body as text, keeping at most `max_bytes`.
///
/// Streams via `chunk()` so an oversized body is never fully buffered.
/// Appends `[truncated]` when the limit was hit.
pub async fn limited_text(resp: Response, max_bytes: usize) -> Result<String> {
    let mut buf = Vec::new();
    let mut stream = resp;
    let mut truncated = false;
    while let Some(chunk) = stream.chunk().await? {
        if buf.len() + chunk.len() > max_bytes {
            let remaining = max_bytes.saturating_sub(buf.len());
            buf.extend_from_slice(&chunk[..remaining]);
            truncated = true;
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    let mut text = String::from_utf8_lossy(&buf).into_owned();
    if truncated {
        text.push_str("[truncated]");
    }
    Ok(text)
}

/// Best-effort error body for log messages; never fails.
pub async fn error_body(resp: Response) -> String {
    limited_text(resp, MAX_ERROR_BODY_BYTES)
        .await
        .unwrap_or_else(|_| "unknown".to_string())
}
