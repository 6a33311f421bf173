//! In-memory TTL cache for normalized provider results

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::models::{Provider, ProviderResult};

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Cache key for one provider's result for one address: `{provider}_{ip}`
pub fn cache_key(provider: Provider, ip: &str) -> String {
    format!("{}_{}", provider.as_str(), ip)
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: ProviderResult,
    inserted_at: Instant,
}

/// Thread-safe, size- and time-bounded store shared by every provider
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl ResponseCache {
    /// Create a new cache
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::with_capacity(capacity)),
            ttl,
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // Entries are plain values, a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        entry.inserted_at.elapsed() >= self.ttl
    }

    /// Get a cached result if present and not expired
    pub fn get(&self, key: &str) -> Option<ProviderResult> {
        let entries = self.lock();
        let entry = entries.get(key)?;

        if self.is_expired(entry) {
            // Left in place, the janitor or the next insert drops it
            None
        } else {
            Some(entry.value.clone())
        }
    }

    /// Insert or overwrite a result
    pub fn insert(&self, key: impl Into<String>, value: ProviderResult) {
        let key = key.into();
        let mut entries = self.lock();

        if self.capacity == 0 {
            return;
        }

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            entries.retain(|_, e| e.inserted_at.elapsed() < self.ttl);

            if entries.len() >= self.capacity {
                if let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone())
                {
                    tracing::debug!(key = %oldest, "Evicting oldest cache entry");
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.inserted_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AbuseResult, FeodoResult};
    use std::sync::Arc;
    use std::thread;

    fn abuse(score: u8) -> ProviderResult {
        AbuseResult {
            confidence_score: score,
            ..AbuseResult::default()
        }
        .into()
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(cache_key(Provider::AbuseIpDb, "1.2.3.4"), "abuseipdb_1.2.3.4");
        assert_eq!(
            cache_key(Provider::FeodoTracker, "1.2.3.4"),
            "feodo_tracker_1.2.3.4"
        );
    }

    #[test]
    fn test_cache_set_and_get() {
        let cache = ResponseCache::default();
        cache.insert("abuseipdb_1.1.1.1", abuse(42));

        assert_eq!(cache.get("abuseipdb_1.1.1.1"), Some(abuse(42)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_miss() {
        let cache = ResponseCache::default();
        assert!(cache.get("abuseipdb_1.1.1.1").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_cache_overwrite() {
        let cache = ResponseCache::default();
        cache.insert("k", abuse(1));
        cache.insert("k", abuse(2));

        assert_eq!(cache.get("k"), Some(abuse(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_expiration() {
        let cache = ResponseCache::new(10, Duration::from_millis(5));
        cache.insert("k", abuse(10));

        thread::sleep(Duration::from_millis(20));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_cache_capacity_evicts_oldest() {
        let cache = ResponseCache::new(2, Duration::from_secs(3600));

        cache.insert("a", abuse(1));
        thread::sleep(Duration::from_millis(2));
        cache.insert("b", abuse(2));
        thread::sleep(Duration::from_millis(2));
        cache.insert("c", abuse(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_cache_capacity_prefers_expired() {
        let cache = ResponseCache::new(2, Duration::from_millis(300));

        cache.insert("old", abuse(1));
        thread::sleep(Duration::from_millis(350));
        cache.insert("fresh", abuse(2));
        cache.insert("new", abuse(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("fresh").is_some());
        assert!(cache.get("new").is_some());
    }

    #[test]
    fn test_cache_holds_mixed_providers() {
        let cache = ResponseCache::default();
        cache.insert(cache_key(Provider::AbuseIpDb, "1.1.1.1"), abuse(1));
        cache.insert(cache_key(Provider::FeodoTracker, "1.1.1.1"), FeodoResult::default().into());

        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.get("feodo_tracker_1.1.1.1"),
            Some(FeodoResult::default().into())
        );
    }

    #[test]
    fn test_cache_concurrent_access() {
        let cache = Arc::new(ResponseCache::new(50, Duration::from_secs(60)));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("k{}_{}", t, i);
                        cache.insert(key.clone(), abuse(i as u8));
                        let _ = cache.get(&key);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 50);
    }
}
