//! Fakes for the two external seams and the progress hook.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::llm::{ChatBackend, ChatRequest, LlmError, LlmResponse, RateLimiter, ResilientClient, RetryPolicy};
use crate::model::PaperRecord;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::retrieval::PaperSource;

type Responder = Box<dyn Fn(&str) -> Result<String, LlmError> + Send + Sync>;

pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    responder: Option<Responder>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicU32,
}

impl ScriptedBackend {
    /// Replays `script` in order; once exhausted every call fails.
    pub fn new(script: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            responder: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn replies<const N: usize>(replies: [&str; N]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    /// Answers every call by inspecting the prompt.
    pub fn responder(f: impl Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(f)),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn always(err: impl Fn() -> LlmError + Send + Sync + 'static) -> Self {
        Self::responder(move |_| Err(err()))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn chat(&self, request: &ChatRequest<'_>) -> Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.to_string());

        let next = match &self.responder {
            Some(f) => f(request.prompt),
            None => self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
                Err(LlmError::Api {
                    status: 500,
                    message: "script exhausted".into(),
                })
            }),
        };

        next.map(|text| LlmResponse {
            text,
            input_tokens: 10,
            output_tokens: 5,
            cost: 0.0,
        })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn notify(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

type SearchFn = Box<dyn Fn(&str, usize, usize) -> Vec<PaperRecord> + Send + Sync>;

/// Paper source answering from a closure and recording `(query, max, start)`.
pub struct StaticSource {
    search: SearchFn,
    requests: Mutex<Vec<(String, usize, usize)>>,
}

impl StaticSource {
    pub fn new(f: impl Fn(&str, usize, usize) -> Vec<PaperRecord> + Send + Sync + 'static) -> Self {
        Self {
            search: Box::new(f),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(|_, _, _| Vec::new())
    }

    pub fn requests(&self) -> Vec<(String, usize, usize)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaperSource for StaticSource {
    async fn search(&self, query: &str, max_results: usize, start: usize) -> Vec<PaperRecord> {
        self.requests
            .lock()
            .unwrap()
            .push((query.to_string(), max_results, start));
        (self.search)(query, max_results, start)
    }
}

pub fn paper(id: &str, title: &str) -> PaperRecord {
    PaperRecord {
        title: title.to_string(),
        authors: vec!["Ada Lovelace".to_string()],
        summary: format!("Summary of {}", title),
        published: "2024-05-01T00:00:00Z".to_string(),
        external_id: id.to_string(),
        url: format!("http://arxiv.org/abs/{}", id),
        categories: vec!["quant-ph".to_string()],
    }
}

/// A resilient client over `backend` with no pacing.
pub fn llm(backend: Arc<ScriptedBackend>, sink: Arc<RecordingSink>) -> ResilientClient {
    ResilientClient::new(
        backend,
        Arc::new(RateLimiter::unlimited()),
        RetryPolicy::default(),
        sink,
    )
}
