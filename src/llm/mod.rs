//! LLM integration for Briefly.
//!
//! The pipelines talk to the model through the [`LlmProvider`] trait. The
//! only production backend is Anthropic's Messages API, called directly over
//! `reqwest` so that assistant prefill and stop sequences are available.

pub mod anthropic;
pub mod costs;
pub mod provider;

pub use anthropic::AnthropicProvider;
pub use costs::{CostAccountant, TokenRates, TokenUsage, response_cost};
pub use provider::*;

use std::sync::Arc;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    /// Base URL override; `None` uses the provider default.
    pub base_url: Option<String>,
}

/// Create an LLM provider from configuration.
pub fn create_provider(
    config: &LlmConfig,
    client: reqwest::Client,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => {
            let mut provider =
                AnthropicProvider::new(client, config.api_key.clone(), config.model.clone());
            if let Some(url) = &config.base_url {
                provider = provider.with_base_url(url.clone());
            }
            tracing::info!("Using Anthropic (model: {})", config.model);
            Ok(Arc::new(provider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_missing_key_still_constructs() {
        // The key is only checked by the API when a request is made.
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: secrecy::SecretString::from("test-key"),
            model: "claude-3-5-sonnet-20240620".to_string(),
            base_url: None,
        };
        let provider = create_provider(&config, reqwest::Client::new());
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "claude-3-5-sonnet-20240620");
    }
}
