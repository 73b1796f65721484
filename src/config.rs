use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::agent::researcher::{OffsetPolicy, ResearchSettings};
use crate::llm::{anthropic, client, RetryPolicy};
use crate::retrieval::arxiv::DEFAULT_ARXIV_URL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub temperature: f32,
    pub system_prompt: String,
    pub llm_timeout: Duration,
    pub retry: RetryPolicy,
    pub requests_per_minute: u32,
    pub burst: u32,
    pub arxiv_url: String,
    pub search_timeout: Duration,
    pub search_max_results: usize,
    pub papers_per_question: usize,
    pub offset: OffsetPolicy,
    pub log_dir: PathBuf,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; blank values count as
    /// unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = match get("LLM_PROVIDER").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("openai") => Provider::OpenAi,
            Some("anthropic") => Provider::Anthropic,
            Some(other) => bail!("LLM_PROVIDER must be 'openai' or 'anthropic', got '{}'", other),
        };

        let (key_fallback, default_url, default_model) = match provider {
            Provider::OpenAi => ("OPENAI_API_KEY", client::DEFAULT_BASE_URL, "gpt-4o-mini"),
            Provider::Anthropic => (
                "ANTHROPIC_API_KEY",
                anthropic::DEFAULT_BASE_URL,
                "claude-3-5-haiku-latest",
            ),
        };

        let llm_api_key = get("LLM_API_KEY")
            .or_else(|| get(key_fallback))
            .with_context(|| format!("LLM_API_KEY or {} must be set", key_fallback))?;

        let offset = match get("OFFSET_JITTER") {
            Some(raw) => OffsetPolicy::Jitter(
                raw.parse::<usize>()
                    .context("OFFSET_JITTER must be a non-negative number")?,
            ),
            None => OffsetPolicy::Stride(parse_or(&get, "OFFSET_STRIDE", 5)?),
        };

        let log_format = match get("LOG_FORMAT").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
        };

        let temperature: f32 = parse_or(&get, "LLM_TEMPERATURE", 0.2)?;
        if !(0.0..=1.0).contains(&temperature) {
            bail!("LLM_TEMPERATURE must be between 0 and 1");
        }

        Ok(Self {
            provider,
            llm_api_key,
            llm_base_url: get("LLM_BASE_URL").unwrap_or_else(|| default_url.into()),
            llm_model: get("LLM_MODEL").unwrap_or_else(|| default_model.into()),
            temperature,
            system_prompt: get("LLM_SYSTEM_PROMPT")
                .unwrap_or_else(|| "You are a helpful research assistant.".into()),
            llm_timeout: Duration::from_secs(parse_or(&get, "LLM_TIMEOUT_SECS", 60)?),
            retry: RetryPolicy {
                rate_limit_attempts: parse_or(&get, "LLM_RATE_LIMIT_ATTEMPTS", 3u32)?.max(1),
                backoff_base: Duration::from_secs(parse_or(&get, "LLM_BACKOFF_BASE_SECS", 25)?),
                backoff_step: Duration::from_secs(parse_or(&get, "LLM_BACKOFF_STEP_SECS", 10)?),
                timeout_retry_wait: Duration::from_secs(parse_or(&get, "LLM_TIMEOUT_RETRY_SECS", 10)?),
            },
            requests_per_minute: parse_or(&get, "LLM_REQUESTS_PER_MINUTE", 6)?,
            burst: parse_or(&get, "LLM_BURST", 1)?,
            arxiv_url: get("ARXIV_URL").unwrap_or_else(|| DEFAULT_ARXIV_URL.into()),
            search_timeout: Duration::from_secs(parse_or(&get, "SEARCH_TIMEOUT_SECS", 15)?),
            search_max_results: parse_or(&get, "SEARCH_MAX_RESULTS", 5)?,
            papers_per_question: parse_or(&get, "PAPERS_PER_QUESTION", 3)?,
            offset,
            log_dir: PathBuf::from(get("LOG_DIR").unwrap_or_else(|| "logs".into())),
            log_format,
        })
    }

    pub fn research_settings(&self) -> ResearchSettings {
        ResearchSettings {
            max_results: self.search_max_results,
            papers_per_question: self.papers_per_question,
            offset: self.offset,
            system_prompt: self.system_prompt.clone(),
            temperature: self.temperature,
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} must be a number, got '{}'", key, raw)),
        None => Ok(default),
    }
}
