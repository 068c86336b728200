//! Short-lived cache of briefing results.
//!
//! Triage and calendar runs are expensive (one LLM call per message), so the
//! HTTP layer keeps their JSON output for a while. Keys are SHA-256
//! fingerprints, so raw access tokens never sit in memory as keys.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Upper bound on cached results.
const MAX_ENTRIES: u64 = 1_000;

/// What kind of result an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Emails,
    Calendar,
}

impl CacheKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Emails => "emails",
            Self::Calendar => "calendar",
        }
    }
}

/// Fingerprint of (kind, identity, date) as lowercase hex.
pub fn cache_key(kind: CacheKind, identity: &str, date: NaiveDate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(identity.as_bytes());
    hasher.update([0]);
    hasher.update(date.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// TTL cache of serialized results.
pub struct ResultCache {
    cache: Cache<String, serde_json::Value>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("entries", &self.cache.entry_count())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let value = self.cache.get(key).await;
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache miss");
        }
        value
    }

    pub async fn insert(&self, key: String, value: serde_json::Value) {
        self.cache.insert(key, value).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn keys_differ_by_kind_identity_and_date() {
        let base = cache_key(CacheKind::Emails, "token-a", day(2));
        assert_eq!(base.len(), 64);
        assert!(base.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(base, cache_key(CacheKind::Emails, "token-a", day(2)));

        assert_ne!(base, cache_key(CacheKind::Calendar, "token-a", day(2)));
        assert_ne!(base, cache_key(CacheKind::Emails, "token-b", day(2)));
        assert_ne!(base, cache_key(CacheKind::Emails, "token-a", day(3)));
        assert!(!base.contains("token-a"));
    }

    #[tokio::test]
    async fn insert_get_invalidate() {
        let cache = ResultCache::new(Duration::from_secs(60));
        let key = cache_key(CacheKind::Calendar, "t", day(2));

        assert!(cache.get(&key).await.is_none());
        cache.insert(key.clone(), json!({"events": []})).await;
        assert_eq!(cache.get(&key).await, Some(json!({"events": []})));

        cache.invalidate(&key).await;
        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 2);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = ResultCache::new(Duration::from_millis(50));
        cache.insert("k".into(), json!(1)).await;
        assert!(cache.get("k").await.is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get("k").await.is_none());
    }
}
