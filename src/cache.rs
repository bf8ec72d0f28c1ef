//! Lookup cache.
//!
//! LRU cache of catalog search results shared by all workers, so tracks of
//! the same album or duplicate files don't re-query the service. Negative
//! results are cached too.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use crate::musicbrainz::LookupMatch;

/// Default cache capacity
pub const CACHE_CAPACITY: usize = 1000;

pub struct LookupCache {
    entries: Mutex<LruCache<String, Option<LookupMatch>>>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::with_capacity(CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn key(title: &str, artist: Option<&str>) -> String {
        format!(
            "{}\u{1f}{}",
            artist.unwrap_or_default().trim().to_lowercase(),
            title.trim().to_lowercase()
        )
    }

    /// Outer `None` is a miss; `Some(None)` is a cached "no match".
    pub fn get(&self, key: &str) -> Option<Option<LookupMatch>> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    pub fn put(&self, key: String, value: Option<LookupMatch>) {
        if let Ok(mut cache) = self.entries.lock() {
            cache.put(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LookupCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LookupMatch {
        LookupMatch {
            recording_id: "rec".into(),
            title: "Song".into(),
            artist: "Band".into(),
            album: Some("Record".into()),
            date: Some("1990".into()),
            genre: None,
            release_id: Some("rel".into()),
        }
    }

    #[test]
    fn test_key_is_normalized() {
        assert_eq!(
            LookupCache::key(" Song ", Some("BAND")),
            LookupCache::key("song", Some("band"))
        );
        assert_ne!(
            LookupCache::key("song", None),
            LookupCache::key("song", Some("band"))
        );
    }

    #[test]
    fn test_negative_results_are_cached() {
        let cache = LookupCache::new();
        let key = LookupCache::key("x", None);
        assert_eq!(cache.get(&key), None);
        cache.put(key.clone(), None);
        assert_eq!(cache.get(&key), Some(None));
        cache.put(key.clone(), Some(sample()));
        assert_eq!(cache.get(&key), Some(Some(sample())));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = LookupCache::with_capacity(2);
        cache.put("a".into(), None);
        cache.put("b".into(), None);
        cache.put("c".into(), None);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 2);
    }
}
