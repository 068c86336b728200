//! "Learn more" requests: deepen a news topic, brief a calendar event, or
//! answer a free-form question.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::complete_priced;
use super::deepen::TopicDeepener;
use super::types::CalendarEvent;
use crate::error::PipelineError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

const ANSWER_MAX_TOKENS: u32 = 1024;

/// What the user wants to learn more about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LearnRequest {
    /// A newsletter topic to research on the web.
    Topic { snippet: String },
    /// A calendar event to prepare for.
    Event(CalendarEvent),
    /// A plain question for the model.
    Query { query: String },
}

impl LearnRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Topic { .. } => "topic",
            Self::Event(_) => "event",
            Self::Query { .. } => "query",
        }
    }
}

/// Render an event as the text block handed to the model.
pub fn format_event_details(event: &CalendarEvent) -> String {
    let location = if event.location.trim().is_empty() {
        "No location specified"
    } else {
        event.location.as_str()
    };

    format!(
        "Event: {}\n\
         When: {} - {}\n\
         Where: {}\n\
         Organizer: {}\n\
         Attendees: {}\n\n\
         Description:\n{}\n\n\
         Context:\n{}",
        event.summary,
        event.start.format("%Y-%m-%d %H:%M UTC"),
        event.end.format("%Y-%m-%d %H:%M UTC"),
        location,
        event.organizer,
        event.attendees.join(", "),
        event.description,
        event.context,
    )
    .trim()
    .to_string()
}

/// Dispatches [`LearnRequest`]s.
pub struct Learner {
    llm: Arc<dyn LlmProvider>,
    /// `None` when web search is not configured.
    deepener: Option<TopicDeepener>,
}

impl Learner {
    pub fn new(llm: Arc<dyn LlmProvider>, deepener: Option<TopicDeepener>) -> Self {
        Self { llm, deepener }
    }

    pub async fn answer(&self, request: LearnRequest) -> Result<(String, Decimal), PipelineError> {
        info!(kind = request.kind(), "Handling learn request");

        match request {
            LearnRequest::Topic { snippet } => match &self.deepener {
                Some(deepener) => deepener.deepen_topic(&snippet).await,
                None => Err(PipelineError::Unavailable(
                    "GOOGLE_SEARCH_API_KEY and GOOGLE_SEARCH_CSE_ID are not set".into(),
                )),
            },
            LearnRequest::Event(event) => {
                let prompt = format!(
                    "I have the following event on my calendar. Brief me on what it is about, \
                     who is involved, and what I should know or prepare beforehand.\n\n\
                     <event>\n{}\n</event>",
                    format_event_details(&event)
                );
                self.ask(prompt).await
            }
            LearnRequest::Query { query } => self.ask(query).await,
        }
    }

    async fn ask(&self, prompt: String) -> Result<(String, Decimal), PipelineError> {
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_max_tokens(ANSWER_MAX_TOKENS)
            .with_temperature(0.0);
        let (answer, cost) = complete_priced(self.llm.as_ref(), request).await?;
        Ok((answer.trim().to_string(), cost))
    }
}
