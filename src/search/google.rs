//! Google Custom Search JSON API client.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

use super::{SearchProvider, SearchResult};
use crate::config::SearchConfig;
use crate::error::SearchError;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// The API returns at most ten results per request.
const MAX_PER_REQUEST: usize = 10;

mod api {
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    pub struct SearchResponse {
        #[serde(default)]
        pub items: Vec<Item>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Item {
        #[serde(default)]
        pub title: String,
        pub link: String,
        #[serde(default)]
        pub snippet: String,
    }
}

/// Custom Search client bound to one engine id.
pub struct GoogleSearchClient {
    client: reqwest::Client,
    api_key: SecretString,
    cse_id: String,
    base_url: String,
}

impl GoogleSearchClient {
    pub fn new(client: reqwest::Client, config: &SearchConfig) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            cse_id: config.cse_id.clone(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl SearchProvider for GoogleSearchClient {
    #[instrument(skip(self), fields(provider = "google_cse"))]
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let num = max_results.clamp(1, MAX_PER_REQUEST).to_string();

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("key", self.api_key.expose_secret()),
                ("cx", self.cse_id.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: api::SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))?;

        let results: Vec<SearchResult> = parsed
            .items
            .into_iter()
            .take(max_results)
            .map(|item| SearchResult {
                title: item.title,
                url: item.link,
                snippet: item.snippet,
            })
            .collect();

        debug!(count = results.len(), "Custom Search results");
        Ok(results)
    }
}
