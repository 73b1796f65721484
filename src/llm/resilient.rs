use std::sync::Arc;
use std::time::Duration;

use super::{ChatBackend, ChatRequest, FailureKind, LlmResponse, RateLimiter};
use crate::progress::{ProgressEvent, ProgressSink};

/// Prefix of every failure string returned in place of model text.
pub const FAILURE_MARKER: &str = "[LLM call failed]";

pub fn is_failure_marker(text: &str) -> bool {
    text.trim_start().starts_with(FAILURE_MARKER)
}

/// Backoff schedule applied by [`ResilientClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed while the provider keeps rate limiting.
    pub rate_limit_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_step: Duration,
    /// Wait before the single retry after a timeout.
    pub timeout_retry_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_attempts: 3,
            backoff_base: Duration::from_secs(25),
            backoff_step: Duration::from_secs(10),
            timeout_retry_wait: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Wait before rate-limit retry number `retry` (1-based): 25s, 35s, 45s, ...
    pub fn rate_limit_wait(&self, retry: u32) -> Duration {
        self.backoff_base + self.backoff_step * retry.saturating_sub(1)
    }
}

/// Wraps a transport with pacing and retry so callers only ever see text.
///
/// Failures come back as text starting with [`FAILURE_MARKER`], never as an
/// error.
#[derive(Clone)]
pub struct ResilientClient {
    backend: Arc<dyn ChatBackend>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    sink: Arc<dyn ProgressSink>,
}

impl ResilientClient {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            backend,
            limiter,
            policy,
            sink,
        }
    }

    pub async fn complete(
        &self,
        prompt: &str,
        system: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> LlmResponse {
        let request = ChatRequest {
            system,
            prompt,
            temperature: temperature.clamp(0.0, 1.0),
            max_tokens,
        };

        let mut rate_limited_attempts = 0u32;
        let mut timeout_retried = false;

        loop {
            self.limiter.acquire().await;

            let err = match self.backend.chat(&request).await {
                Ok(mut response) => {
                    response.text = response.text.trim().to_string();
                    if response.text.is_empty() {
                        let failed = self.give_up(FailureKind::Other, "empty response".into());
                        return LlmResponse {
                            text: failed.text,
                            ..response
                        };
                    }
                    return response;
                }
                Err(err) => err,
            };

            match err.kind() {
                FailureKind::RateLimited => {
                    rate_limited_attempts += 1;
                    if rate_limited_attempts >= self.policy.rate_limit_attempts {
                        return self.give_up(
                            FailureKind::RateLimited,
                            format!(
                                "rate limited after {} attempts: {}",
                                rate_limited_attempts, err
                            ),
                        );
                    }
                    let scheduled = self.policy.rate_limit_wait(rate_limited_attempts);
                    let wait = err.retry_after().map_or(scheduled, |hint| hint.max(scheduled));
                    self.wait_before_retry(
                        FailureKind::RateLimited,
                        rate_limited_attempts,
                        self.policy.rate_limit_attempts,
                        wait,
                    )
                    .await;
                }
                FailureKind::Timeout if !timeout_retried => {
                    timeout_retried = true;
                    self.wait_before_retry(
                        FailureKind::Timeout,
                        1,
                        2,
                        self.policy.timeout_retry_wait,
                    )
                    .await;
                }
                FailureKind::Timeout => {
                    return self.give_up(FailureKind::Timeout, format!("timed out: {}", err));
                }
                FailureKind::Other => {
                    return self.give_up(FailureKind::Other, err.to_string());
                }
            }
        }
    }

    async fn wait_before_retry(
        &self,
        kind: FailureKind,
        attempt: u32,
        max_attempts: u32,
        wait: Duration,
    ) {
        self.sink.notify(&ProgressEvent::RetryScheduled {
            kind,
            attempt,
            max_attempts,
            wait,
        });
        tokio::time::sleep(wait).await;
    }

    fn give_up(&self, kind: FailureKind, detail: String) -> LlmResponse {
        self.sink.notify(&ProgressEvent::CallFailed {
            kind,
            detail: detail.clone(),
        });
        LlmResponse {
            text: format!("{} {}", FAILURE_MARKER, detail),
            ..LlmResponse::default()
        }
    }
}
