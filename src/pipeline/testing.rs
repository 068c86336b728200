//! Stub collaborators shared by the pipeline unit tests.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{LlmError, SearchError, SourceError};
use crate::llm::costs::SONNET_RATES;
use crate::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role};
use crate::pipeline::types::{
    CalendarEvent, CalendarSource, EmailThread, EventWindow, MailSource, Message,
};
use crate::search::{PageFetcher, SearchProvider, SearchResult};

type Reply = dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync;

/// LLM stub that answers through a closure. Every call reports 100 input
/// and 50 output tokens at Sonnet rates.
pub struct ScriptedLlm {
    reply: Box<Reply>,
    jitter: bool,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new<F>(reply: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(reply),
            jitter: false,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Delay each reply by a prompt-dependent 0–19 ms.
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Cost the stub reports for one call.
pub fn call_cost() -> Decimal {
    Decimal::from(100) * SONNET_RATES.input + Decimal::from(50) * SONNET_RATES.output
}

/// Concatenated user-turn text of a request.
pub fn user_text(request: &CompletionRequest) -> String {
    request
        .messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        (SONNET_RATES.input, SONNET_RATES.output)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if self.jitter {
            let mut hasher = DefaultHasher::new();
            user_text(&request).hash(&mut hasher);
            tokio::time::sleep(Duration::from_millis(hasher.finish() % 20)).await;
        }

        let content = (self.reply)(&request)?;
        Ok(CompletionResponse {
            content,
            input_tokens: 100,
            output_tokens: 50,
            finish_reason: FinishReason::StopSequence,
            response_id: None,
        })
    }
}

// ── Sources ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct StubMail {
    pub messages: Vec<Message>,
    pub threads: HashMap<String, Vec<EmailThread>>,
    pub fail: bool,
    /// Attendee whose thread lookup is rejected.
    pub fail_threads_for: Option<String>,
    pub thread_limits: Mutex<Vec<usize>>,
}

#[async_trait]
impl MailSource for StubMail {
    async fn fetch_recent_messages(
        &self,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Message>, SourceError> {
        if self.fail {
            return Err(SourceError::Unauthorized {
                source_name: "stub".into(),
            });
        }
        Ok(self.messages.clone())
    }

    async fn fetch_threads(
        &self,
        attendee: &str,
        limit: usize,
    ) -> Result<Vec<EmailThread>, SourceError> {
        self.thread_limits.lock().unwrap().push(limit);
        if self.fail_threads_for.as_deref() == Some(attendee) {
            return Err(SourceError::Unauthorized {
                source_name: "stub".into(),
            });
        }
        Ok(self
            .threads
            .get(attendee)
            .map(|t| t.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct StubCalendar {
    pub events: Vec<CalendarEvent>,
}

#[async_trait]
impl CalendarSource for StubCalendar {
    async fn fetch_events(&self, _window: EventWindow) -> Result<Vec<CalendarEvent>, SourceError> {
        Ok(self.events.clone())
    }
}

// ── Search ──────────────────────────────────────────────────────────

/// Returns queued result sets in order, then empty sets.
#[derive(Default)]
pub struct StubSearch {
    responses: Mutex<VecDeque<Vec<SearchResult>>>,
    calls: AtomicUsize,
    fail: bool,
}

impl StubSearch {
    pub fn with_responses(responses: Vec<Vec<SearchResult>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// Every search returns an API error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(
        &self,
        _query: &str,
        _max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SearchError::Api {
                status: 500,
                body: "boom".into(),
            });
        }
        Ok(self.responses.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// How a stubbed page responds.
#[derive(Clone)]
pub enum PageBehavior {
    Html(String),
    Fail,
    Hang,
}

#[derive(Default)]
pub struct StubFetcher {
    pub pages: HashMap<String, PageBehavior>,
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<String, SearchError> {
        match self.pages.get(url) {
            Some(PageBehavior::Html(html)) => Ok(html.clone()),
            Some(PageBehavior::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(String::new())
            }
            Some(PageBehavior::Fail) | None => Err(SearchError::FetchFailed {
                url: url.to_string(),
                reason: "stub failure".into(),
            }),
        }
    }
}

pub fn result(n: usize) -> SearchResult {
    SearchResult {
        title: format!("Result {n}"),
        url: format!("https://example.com/{n}"),
        snippet: format!("snippet {n}"),
    }
}
