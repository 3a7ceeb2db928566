//! HTTP client for the chat storage service, the external owner of durable
//! message history. Writes are idempotent on the storage side (a duplicate
//! message id is a no-op success), so retries here never create duplicates.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("storage returned status {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Serialize)]
struct StoreMessageRequest<'a> {
    message: &'a str,
    sender_id: &'a str,
    message_id: &'a str,
}

/// Client for `POST {base}/chats/{room_id}/messages`. Any non-2xx status or
/// transport error is retryable, up to a bounded attempt count with linearly
/// increasing backoff; each request also carries its own timeout so a slow
/// collaborator cannot stall a connection's event loop indefinitely.
#[derive(Clone)]
pub struct StorageClient {
    http: reqwest::Client,
    base_url: String,
    attempts: u32,
    backoff: Duration,
}

impl StorageClient {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        attempts: u32,
        backoff: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client construction cannot fail with static config");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Persist one message. Returns Ok once the storage service acknowledges
    /// the write (including "already exists" answered as 2xx), or the last
    /// error after exhausting every attempt.
    pub async fn store_message(
        &self,
        room_id: &str,
        sender_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), StorageError> {
        let url = format!("{}/chats/{}/messages", self.base_url, room_id);
        let body = StoreMessageRequest {
            message: content,
            sender_id,
            message_id,
        };

        let mut last_error = None;
        for attempt in 1..=self.attempts {
            match self.http.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    if attempt > 1 {
                        tracing::debug!(
                            message_id = %message_id,
                            attempt,
                            "Message persisted after retry"
                        );
                    }
                    return Ok(());
                }
                Ok(response) => {
                    tracing::warn!(
                        message_id = %message_id,
                        attempt,
                        status = %response.status(),
                        "Storage rejected message"
                    );
                    last_error = Some(StorageError::Status(response.status()));
                }
                Err(e) => {
                    tracing::warn!(
                        message_id = %message_id,
                        attempt,
                        error = %e,
                        "Storage request failed"
                    );
                    last_error = Some(StorageError::Transport(e));
                }
            }

            if attempt < self.attempts {
                tokio::time::sleep(self.backoff * attempt).await;
            }
        }

        Err(last_error.expect("attempts >= 1 guarantees at least one error"))
    }
}
