//! Summarizer: personal, newsletter and thread variants.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use super::threads::RankedThread;
use super::types::{Classification, Message, Summary};
use super::{complete_priced, extract_json_object, strip_closing_tag};
use crate::error::PipelineError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::sources::email_types::{trim_reply_history, truncate_chars};

/// Retries after the first malformed newsletter reply.
pub const DEFAULT_MAX_PARSE_RETRIES: u32 = 2;

const PERSONAL_MAX_TOKENS: u32 = 100;
const NEWS_MAX_TOKENS: u32 = 1024;
const THREAD_MAX_TOKENS: u32 = 1024;

/// Per-message body budget in thread prompts.
const THREAD_BODY_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct NewsletterTopics {
    topic_summaries: Vec<String>,
}

/// Produces summaries for classified messages and for related threads.
pub struct Summarizer {
    llm: Arc<dyn LlmProvider>,
    max_parse_retries: u32,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            max_parse_retries: DEFAULT_MAX_PARSE_RETRIES,
        }
    }

    pub fn with_max_parse_retries(mut self, retries: u32) -> Self {
        self.max_parse_retries = retries;
        self
    }

    /// Summarize a message with the variant matching its label.
    pub async fn summarize(
        &self,
        message: &Message,
        label: Classification,
    ) -> Result<(Summary, Decimal), PipelineError> {
        match label {
            Classification::Personal => self.summarize_personal(message).await,
            Classification::News => self.summarize_news(message).await,
            Classification::Spam | Classification::Unclassified => {
                Ok((Summary::default(), Decimal::ZERO))
            }
        }
    }

    /// One short line capturing the central message.
    pub async fn summarize_personal(
        &self,
        message: &Message,
    ) -> Result<(Summary, Decimal), PipelineError> {
        let prompt = format!(
            "You are a personal assistant helping me stay on top of my inbox. \
             Summarize the following email concisely:\n\n\
             <email>\nFrom: {}\nSubject: {}\nBody: {}\n</email>\n\n\
             Capture the central message the email is trying to convey. Keep the summary very short.",
            message.sender_display(),
            message.subject,
            message.body,
        );

        let request = CompletionRequest::new(vec![
            ChatMessage::user(prompt),
            ChatMessage::assistant("<summary>"),
        ])
        .with_stop_sequence("</summary>")
        .with_max_tokens(PERSONAL_MAX_TOKENS)
        .with_temperature(0.0);

        let (raw, cost) = complete_priced(self.llm.as_ref(), request).await?;
        Ok((Summary::Text(strip_closing_tag(&raw, "summary")), cost))
    }

    /// Topic list for a newsletter.
    ///
    /// The model is asked for `{"topic_summaries": [...]}`. Unparseable
    /// replies are retried up to `max_parse_retries` times; the spend of
    /// every attempt counts.
    pub async fn summarize_news(
        &self,
        message: &Message,
    ) -> Result<(Summary, Decimal), PipelineError> {
        let prompt = format!(
            "Summarize the key topics in the following newsletter. Give one short entry \
             per distinct topic.\n\n\
             Respond with ONLY a JSON object:\n\
             {{\"topic_summaries\": [\"...\", \"...\"]}}\n\n\
             Newsletter:\nFrom: {}\nSubject: {}\nBody: {}",
            message.sender_display(),
            message.subject,
            message.body,
        );

        let attempts = 1 + self.max_parse_retries;
        let mut cost = Decimal::ZERO;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let request = CompletionRequest::new(vec![
                ChatMessage::user(prompt.clone()),
                ChatMessage::assistant("{"),
            ])
            .with_max_tokens(NEWS_MAX_TOKENS)
            .with_temperature(0.0);

            let (raw, call_cost) = complete_priced(self.llm.as_ref(), request).await?;
            cost += call_cost;

            match parse_topics(&raw) {
                Ok(topics) => {
                    debug!(id = %message.id, topics = topics.len(), attempt, "Summarized newsletter");
                    return Ok((Summary::Topics(topics), cost));
                }
                Err(e) => {
                    warn!(id = %message.id, attempt, error = %e, "Malformed newsletter summary");
                    last_error = e;
                }
            }
        }

        Err(PipelineError::MalformedOutput {
            attempts,
            reason: last_error,
        })
    }

    /// One summary across the first message of each thread, focused on the
    /// named attendees.
    pub async fn summarize_threads(
        &self,
        threads: &[RankedThread],
        attendees: &[String],
    ) -> Result<(String, Decimal), PipelineError> {
        let combined = threads
            .iter()
            .filter_map(|ranked| ranked.thread.messages.first())
            .map(|msg| {
                let body = trim_reply_history(&msg.body);
                format!(
                    "Subject: {}\nFrom: {} <{}>\nBody: {}...",
                    msg.subject,
                    msg.sender_name,
                    msg.sender_email,
                    truncate_chars(&body, THREAD_BODY_CHARS),
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "Attendees: {}\n\n\
             Summarize the following email threads concisely:\n\n{combined}\n\n\
             Provide a brief summary that captures the main points and any important details. \
             Focus on information relevant to the attendees listed above.",
            attendees.join(", "),
        );

        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_max_tokens(THREAD_MAX_TOKENS)
            .with_temperature(0.0);

        let (raw, cost) = complete_priced(self.llm.as_ref(), request).await?;
        Ok((raw.trim().to_string(), cost))
    }
}

/// Parse a topic list from a reply that continues a `{` prefill. A reply
/// that restates the whole object is accepted too.
fn parse_topics(raw: &str) -> Result<Vec<String>, String> {
    let continued = format!("{{{raw}");
    let mut last_error = String::new();

    for candidate in [continued.as_str(), raw] {
        match serde_json::from_str::<NewsletterTopics>(extract_json_object(candidate)) {
            Ok(parsed) => return Ok(parsed.topic_summaries),
            Err(e) => last_error = format!("JSON parse error: {e}"),
        }
    }
    Err(last_error)
}
