//! Response cache.
//!
//! Content-addressed, TTL-bounded memoization of model gateway calls, used to
//! avoid duplicate billable calls for repeated questions. Keys are derived
//! from the normalized query text plus system prompt, model id, and optional
//! conversation context. Entries are evicted lazily: an expired entry is
//! deleted as a side effect of being read. There is no size-based eviction.
//!
//! The underlying map is guarded by a single mutex; concurrent pipeline runs
//! share one instance, so get/set/clear_expired are serialized through it.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

struct CacheEntry {
    data: Value,
    stored_at: Instant,
}

/// TTL-bounded cache of model responses.
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    /// Derive the content hash for a lookup.
    ///
    /// The query is normalized (trim + lowercase) so casing and surrounding
    /// whitespace do not fragment the cache. Fields are serialized in a fixed
    /// order before hashing so the digest is deterministic.
    pub fn cache_key(
        query: &str,
        system_prompt: &str,
        model: &str,
        context: Option<&str>,
    ) -> String {
        let normalized = query.trim().to_lowercase();
        let payload = format!(
            "query={}\x1fsystem={}\x1fmodel={}\x1fcontext={}",
            normalized,
            system_prompt,
            model,
            context.unwrap_or("")
        );
        let digest = Sha256::digest(payload.as_bytes());
        format!("{:x}", digest)
    }

    /// Look up a cached response. Returns `None` on miss or expiry; an
    /// expired entry is deleted before reporting the miss. A stored JSON
    /// `null` payload is still a hit (`Some(Value::Null)`).
    pub fn get(
        &self,
        query: &str,
        system_prompt: &str,
        model: &str,
        context: Option<&str>,
    ) -> Option<Value> {
        let key = Self::cache_key(query, system_prompt, model, context);
        let mut entries = self.entries.lock().unwrap();

        match entries.get(&key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                debug!("Cache hit for key {}", &key[..12]);
                Some(entry.data.clone())
            }
            Some(_) => {
                debug!("Cache entry expired for key {}", &key[..12]);
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Store a response payload under the derived key.
    pub fn set(
        &self,
        query: &str,
        data: Value,
        system_prompt: &str,
        model: &str,
        context: Option<&str>,
    ) {
        let key = Self::cache_key(query, system_prompt, model, context);
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key,
            CacheEntry {
                data,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Drop expired entries eagerly, returning how many were removed.
    pub fn clear_expired(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_within_ttl() {
        let cache = ResponseCache::new(3600);
        cache.set("show customers", Value::from("SELECT 1"), "sys", "gpt-4o-mini", None);
        let hit = cache.get("show customers", "sys", "gpt-4o-mini", None);
        assert_eq!(hit, Some(Value::from("SELECT 1")));
    }

    #[test]
    fn test_expired_entry_is_deleted_on_read() {
        // Zero TTL: `elapsed < ttl` is strict, so the entry is expired the
        // moment it is stored.
        let cache = ResponseCache::new(0);
        cache.set("q", Value::from("data"), "sys", "m", None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("q", "sys", "m", None), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_key_normalizes_query_casing_and_whitespace() {
        let a = ResponseCache::cache_key("  Show Me Customers  ", "sys", "m", None);
        let b = ResponseCache::cache_key("show me customers", "sys", "m", None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_varies_with_every_field() {
        let base = ResponseCache::cache_key("q", "sys", "m", None);
        assert_ne!(base, ResponseCache::cache_key("q2", "sys", "m", None));
        assert_ne!(base, ResponseCache::cache_key("q", "sys2", "m", None));
        assert_ne!(base, ResponseCache::cache_key("q", "sys", "m2", None));
        assert_ne!(base, ResponseCache::cache_key("q", "sys", "m", Some("ctx")));
    }

    #[test]
    fn test_null_payload_is_a_hit_not_a_miss() {
        let cache = ResponseCache::new(3600);
        cache.set("q", Value::Null, "sys", "m", None);
        assert_eq!(cache.get("q", "sys", "m", None), Some(Value::Null));
        assert_eq!(cache.get("other", "sys", "m", None), None);
    }

    #[test]
    fn test_clear_and_clear_expired() {
        let live = ResponseCache::new(3600);
        live.set("a", Value::from(1), "s", "m", None);
        live.set("b", Value::from(2), "s", "m", None);
        assert_eq!(live.clear_expired(), 0);
        assert_eq!(live.len(), 2);
        live.clear();
        assert!(live.is_empty());

        let expired = ResponseCache::new(0);
        expired.set("a", Value::from(1), "s", "m", None);
        expired.set("b", Value::from(2), "s", "m", None);
        assert_eq!(expired.clear_expired(), 2);
        assert!(expired.is_empty());
    }
}
