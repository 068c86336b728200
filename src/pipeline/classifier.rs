//! Message classifier: assigns one of personal / news / spam.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::debug;

use super::types::{Classification, Message};
use super::{complete_priced, strip_closing_tag};
use crate::error::PipelineError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::sources::email_types::truncate_chars;

/// Only the head of the body is shown to the model.
const BODY_PREVIEW_CHARS: usize = 500;

const CLASSIFY_MAX_TOKENS: u32 = 64;

const TAG: &str = "category";

/// Single-message classifier.
pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Classify one message. Output outside the label set becomes
    /// [`Classification::Unclassified`]; provider failures propagate.
    pub async fn classify(
        &self,
        message: &Message,
    ) -> Result<(Classification, Decimal), PipelineError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::user(build_classify_prompt(message)),
            ChatMessage::assistant(format!("<{TAG}>")),
        ])
        .with_stop_sequence(format!("</{TAG}>"))
        .with_max_tokens(CLASSIFY_MAX_TOKENS)
        .with_temperature(0.0);

        let (raw, cost) = complete_priced(self.llm.as_ref(), request).await?;
        let label = Classification::from_label(&strip_closing_tag(&raw, TAG));

        debug!(id = %message.id, label = label.label(), "Classified message");
        Ok((label, cost))
    }
}

fn build_classify_prompt(message: &Message) -> String {
    format!(
        "Classify the following email into one of the following categories:\n\
         <categories>\npersonal\nnews\nspam\n</categories>\n\n\
         personal emails are from individuals or addressed to me directly. \
         Automated notifications are not personal.\n\
         news emails are newsletters about what is going on in the world.\n\
         spam emails are promotions: selling products, asking for donations, \
         announcing sales, or notifying terms of service changes.\n\n\
         Here is the email:\n<email>\nFrom: {}\nSubject: {}\nBody: {}...\n</email>",
        message.sender_display(),
        message.subject,
        truncate_chars(&message.body, BODY_PREVIEW_CHARS),
    )
}
