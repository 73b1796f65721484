use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("rate limited by provider: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("request timed out: {message}")]
    Timeout { message: String },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("failed to decode response: {message}")]
    Decode { message: String },
}

/// Coarse classes the retry policy distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    Timeout,
    Other,
}

impl FailureKind {
    pub fn describe(&self) -> &'static str {
        match self {
            FailureKind::RateLimited => "rate limited",
            FailureKind::Timeout => "timed out",
            FailureKind::Other => "request failed",
        }
    }
}

impl LlmError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LlmError::RateLimited { .. } => FailureKind::RateLimited,
            LlmError::Timeout { .. } => FailureKind::Timeout,
            LlmError::Api { .. } | LlmError::Transport { .. } | LlmError::Decode { .. } => {
                FailureKind::Other
            }
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Maps a failed HTTP exchange to the error taxonomy.
    pub fn from_status(
        status: reqwest::StatusCode,
        headers: &reqwest::header::HeaderMap,
        body: &str,
    ) -> Self {
        let message = truncate(body, 300).to_string();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return LlmError::RateLimited {
                message,
                retry_after: parse_retry_after(headers),
            };
        }
        if status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::GATEWAY_TIMEOUT
        {
            return LlmError::Timeout { message };
        }
        LlmError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout {
                message: err.to_string(),
            }
        } else if err.is_decode() {
            LlmError::Decode {
                message: err.to_string(),
            }
        } else {
            LlmError::Transport {
                message: err.to_string(),
            }
        }
    }
}

/// Numeric `Retry-After` only; HTTP-date values are ignored.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
    use reqwest::StatusCode;

    #[test]
    fn too_many_requests_is_rate_limited_with_hint() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("40"));
        let err = LlmError::from_status(StatusCode::TOO_MANY_REQUESTS, &headers, "slow down");
        assert_eq!(err.kind(), FailureKind::RateLimited);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(40)));
    }

    #[test]
    fn http_date_retry_after_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        let err = LlmError::from_status(StatusCode::TOO_MANY_REQUESTS, &headers, "");
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn gateway_timeout_is_timeout_and_server_error_is_other() {
        let headers = HeaderMap::new();
        let err = LlmError::from_status(StatusCode::GATEWAY_TIMEOUT, &headers, "");
        assert_eq!(err.kind(), FailureKind::Timeout);
        let err = LlmError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &headers, "boom");
        assert_eq!(err.kind(), FailureKind::Other);
        assert_eq!(err.to_string(), "API error (500): boom");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let err = LlmError::from_status(StatusCode::BAD_REQUEST, &HeaderMap::new(), &body);
        match err {
            LlmError::Api { message, .. } => assert_eq!(message.len(), 300),
            other => panic!("unexpected {:?}", other),
        }
    }
}
