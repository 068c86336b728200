//! Web search and page fetching for topic deepening.

pub mod google;
pub mod scrape;

pub use google::GoogleSearchClient;
pub use scrape::{HttpPageFetcher, PageFetcher, html_to_text};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// One organic search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// A web search backend.
///
/// An empty result set is `Ok(vec![])`; errors are reserved for transport,
/// HTTP and parse failures.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError>;
}

/// Default per-fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
