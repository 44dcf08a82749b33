//! In-memory, TTL-expiring cache in front of the portal fetch path, keyed by
//! a hash of the normalized URL (grounded on `PortalCacheService`/
//! `PortalFetcher`). The core has no persistence layer to put this behind,
//! so it lives as a plain `Mutex<HashMap>` guarded by wall-clock expiry.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

struct Entry {
    raw_html: String,
    expires_at: DateTime<Utc>,
}

/// TTL-expiring cache of fetched portal HTML, keyed by `sha256(lower(trim(url)))`.
pub struct PortalCache {
    ttl_hours: i64,
    entries: Mutex<HashMap<String, Entry>>,
}

impl PortalCache {
    /// Build a cache with the given TTL in hours (spec supplement: default 24).
    #[must_use]
    pub fn new(ttl_hours: i64) -> Self {
        Self { ttl_hours, entries: Mutex::new(HashMap::new()) }
    }

    fn url_hash(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.trim().to_lowercase().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Fetch a cached body for `url` at time `now`, if present and unexpired.
    #[must_use]
    pub fn get(&self, url: &str, now: DateTime<Utc>) -> Option<String> {
        let key = Self::url_hash(url);
        let entries = self.entries.lock().expect("cache mutex poisoned");
        entries.get(&key).filter(|entry| entry.expires_at > now).map(|entry| entry.raw_html.clone())
    }

    /// Record `raw_html` for `url`, expiring `ttl_hours` after `now`.
    pub fn set(&self, url: &str, raw_html: String, now: DateTime<Utc>) {
        let key = Self::url_hash(url);
        let expires_at = now + chrono::Duration::hours(self.ttl_hours);
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.insert(key, Entry { raw_html, expires_at });
    }
}

impl Default for PortalCache {
    fn default() -> Self {
        Self::new(24)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_retrieves_before_expiry() {
        let cache = PortalCache::new(24);
        let now = DateTime::parse_from_rfc3339("2026-07-28T00:00:00Z").unwrap().with_timezone(&Utc);
        cache.set("HTTPS://Example.com/a ", "<html/>".into(), now);
        assert_eq!(cache.get("https://example.com/a", now + chrono::Duration::hours(1)), Some("<html/>".into()));
    }

    #[test]
    fn expires_after_ttl() {
        let cache = PortalCache::new(1);
        let now = DateTime::parse_from_rfc3339("2026-07-28T00:00:00Z").unwrap().with_timezone(&Utc);
        cache.set("https://example.com/a", "<html/>".into(), now);
        assert_eq!(cache.get("https://example.com/a", now + chrono::Duration::hours(2)), None);
    }

    #[test]
    fn miss_on_unknown_url() {
        let cache = PortalCache::new(24);
        let now = Utc::now();
        assert_eq!(cache.get("https://nowhere.example", now), None);
    }
}
