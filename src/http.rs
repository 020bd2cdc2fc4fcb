//! JSON POST with retry and exponential backoff.
//!
//! Shared by the chat-completion generator and the OpenAI embedder:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum PostError {
    #[error("request timed out")]
    Timeout,
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

pub fn client(timeout_secs: u64) -> Result<reqwest::Client, PostError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PostError::Transport(e.to_string()))
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

/// POST `body` to `url` and decode the JSON reply, retrying transient failures.
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &Value,
    max_retries: u32,
) -> Result<Value, PostError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            tokio::time::sleep(backoff(attempt)).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let err = match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| PostError::Decode(e.to_string()));
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = PostError::Status {
                    status: status.as_u16(),
                    body: body_text,
                };
                // Client error (not 429): don't retry
                if !(status.as_u16() == 429 || status.is_server_error()) {
                    return Err(err);
                }
                err
            }
            Err(e) if e.is_timeout() => PostError::Timeout,
            Err(e) => PostError::Transport(e.to_string()),
        };

        warn!(url, attempt, error = %err, "request failed");
        last_err = Some(err);
    }

    Err(last_err.unwrap_or_else(|| PostError::Transport("no attempts made".to_string())))
}
