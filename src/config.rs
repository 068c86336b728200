//! Configuration types.
//!
//! Everything is read once from the environment at startup. Secrets are
//! wrapped in [`SecretString`] so they never end up in `Debug` output.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::pipeline::briefing::BriefingConfig;
use crate::pipeline::deepen::DeepenConfig;

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20240620";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(900);

/// Google Custom Search credentials.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_key: SecretString,
    pub cse_id: String,
}

/// Google API access for the mail and calendar sources.
#[derive(Debug, Clone, Default)]
pub struct GoogleConfig {
    /// Used when a request does not carry its own access token.
    pub access_token: Option<SecretString>,
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Accepted bearer tokens. Empty disables authentication.
    pub api_tokens: Vec<SecretString>,
    pub cache_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            api_tokens: Vec::new(),
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Top-level configuration for the service and the CLI.
#[derive(Debug, Clone)]
pub struct BrieflyConfig {
    pub llm: LlmConfig,
    pub google: GoogleConfig,
    /// `None` when search credentials are absent; topic deepening is then
    /// unavailable.
    pub search: Option<SearchConfig>,
    pub briefing: BriefingConfig,
    pub deepen: DeepenConfig,
    pub server: ServerConfig,
}

impl BrieflyConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get("ANTHROPIC_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("ANTHROPIC_API_KEY".into()))?;

        let llm = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: SecretString::from(api_key),
            model: get("BRIEFLY_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: get("ANTHROPIC_BASE_URL"),
        };

        let search = match (get("GOOGLE_SEARCH_API_KEY"), get("GOOGLE_SEARCH_CSE_ID")) {
            (Some(key), Some(cse_id)) => Some(SearchConfig {
                api_key: SecretString::from(key),
                cse_id,
            }),
            _ => None,
        };

        let google = GoogleConfig {
            access_token: get("GOOGLE_ACCESS_TOKEN").map(SecretString::from),
        };

        let defaults = BriefingConfig::default();
        let briefing = BriefingConfig {
            self_email: get("BRIEFLY_SELF_EMAIL"),
            days_before: parse_or(&get, "BRIEFLY_CALENDAR_DAYS_BEFORE", defaults.days_before)?,
            days_after: parse_or(&get, "BRIEFLY_CALENDAR_DAYS_AFTER", defaults.days_after)?,
            max_threads_per_attendee: parse_or(
                &get,
                "BRIEFLY_MAX_THREADS_PER_ATTENDEE",
                defaults.max_threads_per_attendee,
            )?,
        };

        let defaults = DeepenConfig::default();
        let concurrency: usize =
            parse_or(&get, "BRIEFLY_SCRAPE_CONCURRENCY", defaults.concurrency)?;
        if concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BRIEFLY_SCRAPE_CONCURRENCY".into(),
                message: "must be at least 1".into(),
            });
        }
        let deepen = DeepenConfig {
            concurrency,
            fetch_timeout: Duration::from_secs(parse_or(
                &get,
                "BRIEFLY_SCRAPE_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )?),
            empty_search_retries: parse_or(
                &get,
                "BRIEFLY_EMPTY_SEARCH_RETRIES",
                defaults.empty_search_retries,
            )?,
            ..defaults
        };

        let server = ServerConfig {
            port: parse_or(&get, "BRIEFLY_PORT", DEFAULT_PORT)?,
            api_tokens: get("BRIEFLY_API_TOKENS")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| SecretString::from(s.to_string()))
                .collect(),
            cache_ttl: Duration::from_secs(parse_or(
                &get,
                "BRIEFLY_CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL.as_secs(),
            )?),
        };

        Ok(Self {
            llm,
            google,
            search,
            briefing,
            deepen,
            server,
        })
    }
}

/// Parse `key` when present, otherwise return `default`.
fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let err = BrieflyConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "ANTHROPIC_API_KEY"));
    }

    #[test]
    fn defaults_apply() {
        let config = BrieflyConfig::from_lookup(lookup(&[("ANTHROPIC_API_KEY", "k")])).unwrap();
        assert_eq!(config.llm.model, DEFAULT_MODEL);
        assert!(config.llm.base_url.is_none());
        assert!(config.search.is_none());
        assert!(config.google.access_token.is_none());
        assert_eq!(config.server.port, 8000);
        assert!(config.server.api_tokens.is_empty());
        assert_eq!(config.server.cache_ttl, Duration::from_secs(900));
        assert_eq!(config.briefing.days_before, 2);
        assert_eq!(config.briefing.days_after, 0);
        assert_eq!(config.briefing.max_threads_per_attendee, 10);
        assert_eq!(config.deepen.concurrency, 5);
        assert_eq!(config.deepen.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.deepen.empty_search_retries, 1);
    }

    #[test]
    fn overrides_are_read() {
        let config = BrieflyConfig::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "k"),
            ("BRIEFLY_MODEL", "claude-3-5-haiku-latest"),
            ("GOOGLE_SEARCH_API_KEY", "gkey"),
            ("GOOGLE_SEARCH_CSE_ID", "cse"),
            ("BRIEFLY_API_TOKENS", "one, two,,"),
            ("BRIEFLY_PORT", "9000"),
            ("BRIEFLY_SELF_EMAIL", "me@example.com"),
            ("BRIEFLY_SCRAPE_CONCURRENCY", "3"),
            ("BRIEFLY_EMPTY_SEARCH_RETRIES", "0"),
        ]))
        .unwrap();

        assert_eq!(config.llm.model, "claude-3-5-haiku-latest");
        let search = config.search.unwrap();
        assert_eq!(search.cse_id, "cse");
        assert_eq!(search.api_key.expose_secret(), "gkey");
        let tokens: Vec<&str> = config
            .server
            .api_tokens
            .iter()
            .map(|t| t.expose_secret())
            .collect();
        assert_eq!(tokens, vec!["one", "two"]);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.briefing.self_email.as_deref(), Some("me@example.com"));
        assert_eq!(config.deepen.concurrency, 3);
        assert_eq!(config.deepen.empty_search_retries, 0);
    }

    #[test]
    fn search_needs_both_credentials() {
        let config = BrieflyConfig::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "k"),
            ("GOOGLE_SEARCH_API_KEY", "gkey"),
        ]))
        .unwrap();
        assert!(config.search.is_none());
    }

    #[test]
    fn invalid_number_is_reported() {
        let err = BrieflyConfig::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "k"),
            ("BRIEFLY_PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "BRIEFLY_PORT"));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = BrieflyConfig::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "k"),
            ("BRIEFLY_SCRAPE_CONCURRENCY", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
