pub mod anthropic;
pub mod client;
pub mod error;
pub mod rate_limiter;
pub mod resilient;

use async_trait::async_trait;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::{FailureKind, LlmError};
pub use rate_limiter::RateLimiter;
pub use resilient::{is_failure_marker, ResilientClient, RetryPolicy};

/// One chat-completion call: a system preamble plus a single user turn.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: f64,
}

/// Token and cost totals across one or more calls.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Usage {
    pub calls: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: f64,
}

impl Usage {
    pub fn record(&mut self, response: &LlmResponse) {
        self.calls += 1;
        self.input_tokens += response.input_tokens;
        self.output_tokens += response.output_tokens;
        self.cost += response.cost;
    }
}

/// The chat-completion transport. Implementations perform exactly one HTTP
/// exchange per call; retries live in [`ResilientClient`].
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: &ChatRequest<'_>) -> Result<LlmResponse, LlmError>;
}
