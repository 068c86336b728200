//! Shared types for the briefing pipelines.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::sources::email_types::address_of;

// ── Classification ──────────────────────────────────────────────────

/// Triage label for a message.
///
/// The model chooses among `Personal`, `News` and `Spam`; any other answer
/// is recorded as `Unclassified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Personal,
    News,
    Spam,
    Unclassified,
}

impl Classification {
    /// Map raw model output onto the closed label set.
    pub fn from_label(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "personal" => Self::Personal,
            "news" => Self::News,
            "spam" => Self::Spam,
            _ => Self::Unclassified,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::News => "news",
            Self::Spam => "spam",
            Self::Unclassified => "unclassified",
        }
    }
}

// ── Message ─────────────────────────────────────────────────────────

/// Summary attached to a message: one line for personal mail, a topic list
/// for newsletters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Summary {
    Text(String),
    Topics(Vec<String>),
}

impl Default for Summary {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Topics(topics) => topics.is_empty(),
        }
    }
}

/// An email fetched from the mail provider.
///
/// Identity (`id`) is fixed at fetch time; `classification` and `summary`
/// are written in place by the triage pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub snippet: String,
    pub subject: String,
    pub sender_name: String,
    pub sender_email: String,
    /// To and Cc addresses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<String>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub classification: Option<Classification>,
    #[serde(default)]
    pub summary: Summary,
}

impl Message {
    /// Formatted sender, `Name <email>` when both are known.
    pub fn sender_display(&self) -> String {
        if self.sender_name.is_empty() || self.sender_name == self.sender_email {
            self.sender_email.clone()
        } else {
            format!("{} <{}>", self.sender_name, self.sender_email)
        }
    }

    /// Sender and recipient addresses, lower-cased.
    pub fn participants(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.sender_email.as_str())
            .chain(self.recipients.iter().map(String::as_str))
            .map(|raw| address_of(raw).to_ascii_lowercase())
            .filter(|a| !a.is_empty())
    }
}

/// A conversation: messages sharing a thread id, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailThread {
    pub id: String,
    pub messages: Vec<Message>,
}

impl EmailThread {
    /// Every address that sent or received a message in this thread.
    pub fn participants(&self) -> BTreeSet<String> {
        self.messages.iter().flat_map(Message::participants).collect()
    }
}

// ── Calendar ────────────────────────────────────────────────────────

/// A calendar event in the briefing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub summary: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub organizer: String,
    /// Attendee addresses, de-duplicated in first-seen order.
    #[serde(default)]
    pub attendees: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    /// Summary of related email threads; empty when none were found.
    #[serde(default)]
    pub context: String,
}

/// Time range for calendar queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

// ── Results ─────────────────────────────────────────────────────────

/// Three-way partition of the fetched messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailTriageResult {
    #[serde(rename = "personal_emails")]
    pub personal: Vec<Message>,
    #[serde(rename = "news_emails")]
    pub news: Vec<Message>,
    #[serde(rename = "spam_emails")]
    pub spam: Vec<Message>,
}

impl EmailTriageResult {
    pub fn len(&self) -> usize {
        self.personal.len() + self.news.len() + self.spam.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of one triage run.
#[derive(Debug, Clone, PartialEq)]
pub struct TriageOutcome {
    pub result: EmailTriageResult,
    /// Ids of messages whose label was outside the closed set. They appear
    /// in none of the partitions.
    pub excluded: Vec<String>,
    pub cost: Decimal,
}

/// Events with their email context filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarBriefing {
    pub events: Vec<CalendarEvent>,
}

// ── Source adapter traits ───────────────────────────────────────────

/// Mail provider adapter. Pure I/O, no business logic.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// All messages received at or after `since`, newest first as the
    /// provider returns them.
    async fn fetch_recent_messages(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Message>, SourceError>;

    /// Up to `limit` threads the attendee sent to or received from.
    async fn fetch_threads(
        &self,
        attendee: &str,
        limit: usize,
    ) -> Result<Vec<EmailThread>, SourceError>;
}

/// Calendar provider adapter. Pure I/O, no business logic.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn fetch_events(&self, window: EventWindow) -> Result<Vec<CalendarEvent>, SourceError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_from_label() {
        assert_eq!(Classification::from_label("personal"), Classification::Personal);
        assert_eq!(Classification::from_label(" News \n"), Classification::News);
        assert_eq!(Classification::from_label("SPAM"), Classification::Spam);
        assert_eq!(
            Classification::from_label("promotional"),
            Classification::Unclassified
        );
        assert_eq!(Classification::from_label(""), Classification::Unclassified);
    }

    #[test]
    fn summary_serializes_untagged() {
        let text = serde_json::to_value(Summary::Text("hi".into())).unwrap();
        assert_eq!(text, serde_json::json!("hi"));

        let topics = serde_json::to_value(Summary::Topics(vec!["a".into(), "b".into()])).unwrap();
        assert_eq!(topics, serde_json::json!(["a", "b"]));
    }

    #[test]
    fn triage_result_uses_wire_names() {
        let json = serde_json::to_value(EmailTriageResult::default()).unwrap();
        assert!(json["personal_emails"].is_array());
        assert!(json["news_emails"].is_array());
        assert!(json["spam_emails"].is_array());
    }

    #[test]
    fn thread_participants_are_normalized() {
        let mut first = fixtures::message("1", "Alice@Example.com", "hi", "body");
        first.recipients = vec!["Bob <BOB@example.com>".into(), "carol@example.com".into()];
        let second = fixtures::message("2", "bob@example.com", "re: hi", "body");

        let thread = EmailThread {
            id: "t1".into(),
            messages: vec![first, second],
        };

        let participants: Vec<String> = thread.participants().into_iter().collect();
        assert_eq!(
            participants,
            vec!["alice@example.com", "bob@example.com", "carol@example.com"]
        );
    }

    #[test]
    fn sender_display_formats() {
        let mut msg = fixtures::message("1", "alice@example.com", "s", "b");
        msg.sender_name = "Alice".into();
        assert_eq!(msg.sender_display(), "Alice <alice@example.com>");
        msg.sender_name = String::new();
        assert_eq!(msg.sender_display(), "alice@example.com");
    }
}
