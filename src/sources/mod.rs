//! Mail and calendar sources.
//!
//! The pipelines see these only through [`MailSource`] and
//! [`CalendarSource`]. The Google REST clients here are built per request
//! from the caller's OAuth access token; refreshing that token is the
//! caller's job.

pub mod calendar;
pub mod email_types;
pub mod gmail;

pub use calendar::GoogleCalendarClient;
pub use gmail::GmailClient;

pub use crate::pipeline::types::{CalendarSource, MailSource};

use std::sync::Arc;

use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::SourceError;

/// Builds request-scoped sources from a Google access token.
pub trait SourceFactory: Send + Sync {
    fn mail(&self, token: SecretString) -> Arc<dyn MailSource>;
    fn calendar(&self, token: SecretString) -> Arc<dyn CalendarSource>;
}

/// Production factory: Gmail and Google Calendar REST clients sharing one
/// connection pool.
#[derive(Clone)]
pub struct GoogleSourceFactory {
    client: reqwest::Client,
    base_urls: Option<(String, String)>,
}

impl GoogleSourceFactory {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_urls: None,
        }
    }

    /// Point both clients at other hosts (tests, proxies).
    pub fn with_base_urls(mut self, gmail: impl Into<String>, calendar: impl Into<String>) -> Self {
        self.base_urls = Some((gmail.into(), calendar.into()));
        self
    }
}

impl SourceFactory for GoogleSourceFactory {
    fn mail(&self, token: SecretString) -> Arc<dyn MailSource> {
        let client = GmailClient::new(self.client.clone(), token);
        match &self.base_urls {
            Some((gmail, _)) => Arc::new(client.with_base_url(gmail.clone())),
            None => Arc::new(client),
        }
    }

    fn calendar(&self, token: SecretString) -> Arc<dyn CalendarSource> {
        let client = GoogleCalendarClient::new(self.client.clone(), token);
        match &self.base_urls {
            Some((_, calendar)) => Arc::new(client.with_base_url(calendar.clone())),
            None => Arc::new(client),
        }
    }
}

/// Build `base` + path segments, percent-encoding each segment.
pub(crate) fn endpoint(
    base: &str,
    segments: &[&str],
    source_name: &str,
) -> Result<Url, SourceError> {
    let invalid = |reason: String| SourceError::RequestFailed {
        source_name: source_name.to_string(),
        reason,
    };

    let mut url = Url::parse(base).map_err(|e| invalid(format!("bad base URL {base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| invalid(format!("base URL {base} cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// GET a Google API endpoint with a bearer token and decode the JSON body.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: Url,
    token: &SecretString,
    query: &[(&str, String)],
    source_name: &str,
) -> Result<T, SourceError> {
    debug!(source = source_name, url = %url, "Google API request");

    let response = client
        .get(url)
        .bearer_auth(token.expose_secret())
        .query(query)
        .send()
        .await
        .map_err(|e| SourceError::RequestFailed {
            source_name: source_name.to_string(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(SourceError::Unauthorized {
            source_name: source_name.to_string(),
        });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Api {
            source_name: source_name.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    response.json().await.map_err(|e| SourceError::Parse {
        source_name: source_name.to_string(),
        reason: e.to_string(),
    })
}
