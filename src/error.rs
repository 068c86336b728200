//! Error types for Briefly.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Mail and calendar provider errors.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{source_name} request failed: {reason}")]
    RequestFailed { source_name: String, reason: String },

    #[error("{source_name} rejected credentials")]
    Unauthorized { source_name: String },

    #[error("{source_name} returned HTTP {status}: {body}")]
    Api {
        source_name: String,
        status: u16,
        body: String,
    },

    #[error("Failed to parse {source_name} payload: {reason}")]
    Parse { source_name: String, reason: String },

    #[error("No Google access token available")]
    MissingToken,
}

/// Web search and page fetch errors.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Search provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse search response: {0}")]
    Parse(String),

    #[error("Fetching {url} failed: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("Fetching {url} timed out after {timeout:?}")]
    FetchTimeout { url: String, timeout: Duration },
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Fetch stage failed: {0}")]
    Fetch(#[from] SourceError),

    #[error("Search stage failed: {0}")]
    Search(#[from] SearchError),

    #[error("Malformed model output after {attempts} attempt(s): {reason}")]
    MalformedOutput { attempts: u32, reason: String },

    #[error("Deepening is unavailable: {0}")]
    Unavailable(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}
