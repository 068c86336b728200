//! Gmail REST client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use secrecy::SecretString;
use tracing::{debug, info};

use super::email_types::{decode_body, parse_address, split_address_list};
use super::{endpoint, get_json};
use crate::error::SourceError;
use crate::pipeline::types::{EmailThread, MailSource, Message, Summary};
use crate::search::scrape::html_to_text;

pub const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com";

const SOURCE: &str = "gmail";

/// Detail requests in flight at once.
const DETAIL_CONCURRENCY: usize = 10;

mod api {
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageList {
        #[serde(default)]
        pub messages: Vec<MessageRef>,
        pub next_page_token: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct MessageRef {
        pub id: String,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct ThreadList {
        #[serde(default)]
        pub threads: Vec<ThreadRef>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ThreadRef {
        pub id: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct Thread {
        pub id: String,
        #[serde(default)]
        pub messages: Vec<GmailMessage>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        #[serde(default)]
        pub thread_id: String,
        #[serde(default)]
        pub label_ids: Vec<String>,
        #[serde(default)]
        pub snippet: String,
        /// Milliseconds since the epoch, as a string.
        pub internal_date: Option<String>,
        #[serde(default)]
        pub payload: Part,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Part {
        #[serde(default)]
        pub mime_type: String,
        #[serde(default)]
        pub headers: Vec<Header>,
        #[serde(default)]
        pub body: Body,
        #[serde(default)]
        pub parts: Vec<Part>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Body {
        pub data: Option<String>,
    }
}

/// Gmail client for one user's access token.
pub struct GmailClient {
    client: reqwest::Client,
    token: SecretString,
    base_url: String,
}

impl GmailClient {
    pub fn new(client: reqwest::Client, token: SecretString) -> Self {
        Self {
            client,
            token,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (mock servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn url(&self, segments: &[&str]) -> Result<reqwest::Url, SourceError> {
        let mut path = vec!["gmail", "v1", "users", "me"];
        path.extend_from_slice(segments);
        endpoint(&self.base_url, &path, SOURCE)
    }

    async fn list_message_ids(&self, query: &str) -> Result<Vec<String>, SourceError> {
        let url = self.url(&["messages"])?;
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![("q", query.to_string())];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let page: api::MessageList =
                get_json(&self.client, url.clone(), &self.token, &params, SOURCE).await?;
            ids.extend(page.messages.into_iter().map(|m| m.id));

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(ids)
    }

    async fn get_message(&self, id: &str) -> Result<Message, SourceError> {
        let url = self.url(&["messages", id])?;
        let raw: api::GmailMessage = get_json(
            &self.client,
            url,
            &self.token,
            &[("format", "full".to_string())],
            SOURCE,
        )
        .await?;
        Ok(convert_message(raw))
    }

    async fn get_thread(&self, id: &str) -> Result<EmailThread, SourceError> {
        let url = self.url(&["threads", id])?;
        let raw: api::Thread = get_json(
            &self.client,
            url,
            &self.token,
            &[("format", "full".to_string())],
            SOURCE,
        )
        .await?;
        Ok(EmailThread {
            id: raw.id,
            messages: raw.messages.into_iter().map(convert_message).collect(),
        })
    }
}

#[async_trait]
impl MailSource for GmailClient {
    async fn fetch_recent_messages(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Message>, SourceError> {
        let query = format!("after:{}", since.timestamp());
        let ids = self.list_message_ids(&query).await?;
        debug!(count = ids.len(), %query, "Listed Gmail messages");

        let messages: Vec<Message> = stream::iter(ids)
            .map(|id| async move { self.get_message(&id).await })
            .buffered(DETAIL_CONCURRENCY)
            .try_collect()
            .await?;

        info!(count = messages.len(), "Fetched recent Gmail messages");
        Ok(messages)
    }

    async fn fetch_threads(
        &self,
        attendee: &str,
        limit: usize,
    ) -> Result<Vec<EmailThread>, SourceError> {
        let url = self.url(&["threads"])?;
        let params = [
            ("q", format!("to:{attendee} OR from:{attendee}")),
            ("maxResults", limit.to_string()),
        ];
        let list: api::ThreadList =
            get_json(&self.client, url, &self.token, &params, SOURCE).await?;

        let threads: Vec<EmailThread> = stream::iter(list.threads.into_iter().take(limit))
            .map(|t| async move { self.get_thread(&t.id).await })
            .buffered(DETAIL_CONCURRENCY)
            .try_collect()
            .await?;

        debug!(attendee, count = threads.len(), "Fetched Gmail threads");
        Ok(threads)
    }
}

// ── Payload conversion ──────────────────────────────────────────────

fn convert_message(raw: api::GmailMessage) -> Message {
    let header = |name: &str| {
        raw.payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
            .unwrap_or_default()
    };

    let (sender_name, sender_email) = parse_address(&header("From"));
    let mut recipients = split_address_list(&header("To"));
    recipients.extend(split_address_list(&header("Cc")));

    let timestamp = raw
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(DateTime::UNIX_EPOCH);

    let subject = header("Subject");
    let body = extract_body(&raw.payload);

    Message {
        id: raw.id,
        thread_id: raw.thread_id,
        labels: raw.label_ids,
        snippet: raw.snippet,
        subject,
        sender_name,
        sender_email,
        recipients,
        body,
        timestamp,
        classification: None,
        summary: Summary::default(),
    }
}

/// Readable text of a message: the first `text/plain` part, else the first
/// `text/html` part converted to text.
fn extract_body(payload: &api::Part) -> String {
    if let Some(text) = find_part(payload, "text/plain") {
        return text;
    }
    if let Some(html) = find_part(payload, "text/html") {
        return html_to_text(&html);
    }
    String::new()
}

fn find_part(part: &api::Part, mime_type: &str) -> Option<String> {
    if part.mime_type.eq_ignore_ascii_case(mime_type)
        && let Some(text) = part.body.data.as_deref().and_then(decode_body)
    {
        return Some(text);
    }
    part.parts.iter().find_map(|p| find_part(p, mime_type))
}
