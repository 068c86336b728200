//! Topic deepening: turns a short news snippet into a researched summary.
//!
//! query generation → web search (retried on an empty result set) →
//! bounded page fetch with per-fetch timeout → HTML to text → synthesis.
//! Search and synthesis failures are fatal; individual page failures are
//! logged and skipped.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::{complete_priced, strip_closing_tag};
use crate::error::PipelineError;
use crate::llm::{ChatMessage, CompletionRequest, CostAccountant, LlmProvider};
use crate::search::{
    DEFAULT_FETCH_TIMEOUT, PageFetcher, SearchProvider, SearchResult, html_to_text,
};
use crate::sources::email_types::truncate_chars;

const QUERY_MAX_TOKENS: u32 = 64;
const SYNTHESIS_MAX_TOKENS: u32 = 1024;

/// Deepening settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepenConfig {
    /// Results requested from the search provider.
    pub max_results: usize,
    /// Pages fetched at once.
    pub concurrency: usize,
    pub fetch_timeout: Duration,
    /// Extra searches when a search comes back empty.
    pub empty_search_retries: u32,
    /// Characters of each page passed to synthesis.
    pub page_char_budget: usize,
}

impl Default for DeepenConfig {
    fn default() -> Self {
        Self {
            max_results: 10,
            concurrency: 5,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            empty_search_retries: 1,
            page_char_budget: 6000,
        }
    }
}

/// A fetched page reduced to text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Page {
    url: String,
    text: String,
}

pub struct TopicDeepener {
    llm: Arc<dyn LlmProvider>,
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    config: DeepenConfig,
}

impl TopicDeepener {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        config: DeepenConfig,
    ) -> Self {
        Self {
            llm,
            search,
            fetcher,
            config,
        }
    }

    /// Research `snippet` on the web and synthesize a detailed summary.
    pub async fn deepen_topic(&self, snippet: &str) -> Result<(String, Decimal), PipelineError> {
        let mut costs = CostAccountant::new();

        let (query, cost) = self.generate_query(snippet).await?;
        costs.add(cost);
        info!(%query, "Deepening topic");

        let results = self.search_with_retry(&query).await?;
        let pages = self.fetch_pages(&results).await;
        info!(
            results = results.len(),
            pages = pages.len(),
            "Fetched research pages"
        );

        let (summary, cost) = self.synthesize(snippet, &pages).await?;
        costs.add(cost);

        info!(cost = %costs.total(), llm_calls = costs.calls(), "Topic deepening complete");
        Ok((summary, costs.total()))
    }

    async fn generate_query(&self, snippet: &str) -> Result<(String, Decimal), PipelineError> {
        let prompt = format!(
            "Based on this snippet of news, generate a very concise Google search query \
             to find more information.\n<snippet>\n{snippet}\n</snippet>"
        );
        let request = CompletionRequest::new(vec![
            ChatMessage::user(prompt),
            ChatMessage::assistant("<search_query>"),
        ])
        .with_stop_sequence("</search_query>")
        .with_max_tokens(QUERY_MAX_TOKENS)
        .with_temperature(0.0);

        let (raw, cost) = complete_priced(self.llm.as_ref(), request).await?;
        let query = strip_closing_tag(&raw, "search_query");
        if query.is_empty() {
            warn!("Model returned an empty search query, searching the snippet");
            return Ok((truncate_chars(snippet.trim(), 200).to_string(), cost));
        }
        Ok((query, cost))
    }

    /// Search, repeating up to `empty_search_retries` times while the result
    /// set is empty. The last result set is accepted even when empty.
    async fn search_with_retry(&self, query: &str) -> Result<Vec<SearchResult>, PipelineError> {
        let mut results = self.search.search(query, self.config.max_results).await?;
        let mut retries = 0;
        while results.is_empty() && retries < self.config.empty_search_retries {
            retries += 1;
            warn!(query, retry = retries, "Empty search results, retrying");
            results = self.search.search(query, self.config.max_results).await?;
        }
        Ok(results)
    }

    /// Fetch result pages with a bounded pool. Output keeps result order;
    /// failures, timeouts and empty pages are dropped.
    async fn fetch_pages(&self, results: &[SearchResult]) -> Vec<Page> {
        let timeout = self.config.fetch_timeout;
        let urls: Vec<String> = results.iter().map(|r| r.url.clone()).collect();

        stream::iter(urls)
            .map(|url| async move {
                match tokio::time::timeout(timeout, self.fetcher.fetch(&url, timeout)).await {
                    Ok(Ok(html)) => {
                        let text = html_to_text(&html);
                        debug!(url = %url, chars = text.len(), "Extracted page text");
                        (!text.is_empty()).then_some(Page { url, text })
                    }
                    Ok(Err(e)) => {
                        warn!(url = %url, error = %e, "Page fetch failed");
                        None
                    }
                    Err(_) => {
                        warn!(url = %url, ?timeout, "Page fetch timed out");
                        None
                    }
                }
            })
            .buffered(self.config.concurrency.max(1))
            .filter_map(|page| async move { page })
            .collect()
            .await
    }

    async fn synthesize(
        &self,
        snippet: &str,
        pages: &[Page],
    ) -> Result<(String, Decimal), PipelineError> {
        let research: String = pages
            .iter()
            .enumerate()
            .map(|(i, page)| {
                format!(
                    "\nPage {} ({}):\n{}",
                    i + 1,
                    page.url,
                    truncate_chars(&page.text, self.config.page_char_budget)
                )
            })
            .collect();

        let prompt = format!(
            "After reading a small news segment, I have conducted additional research on the topic. \
             Synthesize the research into a comprehensive summary that provides detailed insight \
             on the news segment.\n\n\
             <news_segment>\n{snippet}\n</news_segment>\n\n<research>{research}\n</research>"
        );
        let request = CompletionRequest::new(vec![
            ChatMessage::user(prompt),
            ChatMessage::assistant("<comprehensive_summary>"),
        ])
        .with_stop_sequence("</comprehensive_summary>")
        .with_max_tokens(SYNTHESIS_MAX_TOKENS)
        .with_temperature(0.0);

        let (raw, cost) = complete_priced(self.llm.as_ref(), request).await?;
        Ok((strip_closing_tag(&raw, "comprehensive_summary"), cost))
    }
}
