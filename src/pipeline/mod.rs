//! Briefing pipelines.
//!
//! Email triage:
//! 1. `MailSource::fetch_recent_messages()`: provider I/O
//! 2. `Classifier::classify()`: one LLM call per message, all concurrent
//! 3. Partition into personal / news / spam
//! 4. `Summarizer`: label-specific summary per useful message, concurrent
//!
//! Calendar briefing: events → attendee threads → thread summary as context.
//!
//! Topic deepening: query → web search → bounded page fetch → synthesis.
//!
//! Learn requests: topic (deepening), event (briefing prompt) or free-form query.
//!
//! Every stage returns its spend alongside its value; orchestrators add
//! those into a `CostAccountant` after each fan-out completes.

pub mod briefing;
pub mod classifier;
pub mod deepen;
pub mod learn;
pub mod summarizer;
pub mod threads;
pub mod triage;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use briefing::{BriefingConfig, CalendarBriefer};
pub use classifier::Classifier;
pub use deepen::{DeepenConfig, TopicDeepener};
pub use learn::{LearnRequest, Learner, format_event_details};
pub use summarizer::Summarizer;
pub use threads::{RankedThread, ThreadAggregator};
pub use triage::TriagePipeline;

use rust_decimal::Decimal;

use crate::error::LlmError;
use crate::llm::{CompletionRequest, LlmProvider, response_cost};

/// Run one completion and price it.
pub(crate) async fn complete_priced(
    llm: &dyn LlmProvider,
    request: CompletionRequest,
) -> Result<(String, Decimal), LlmError> {
    let response = llm.complete(request).await?;
    let cost = response_cost(llm, &response);
    Ok((response.content, cost))
}

/// Trim model output and drop a trailing `</tag>` if the stop sequence did
/// not catch it.
pub(crate) fn strip_closing_tag(text: &str, tag: &str) -> String {
    let trimmed = text.trim();
    let closing = format!("</{tag}>");
    trimmed
        .strip_suffix(closing.as_str())
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

/// Extract a JSON object from LLM output (handles markdown wrapping and
/// surrounding prose).
pub(crate) fn extract_json_object(text: &str) -> &str {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner;
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}
