use crate::{CacheDigest, CacheEntry};
use lru::LruCache;
use std::num::NonZeroUsize;

pub(crate) enum Lookup {
    Hit(CacheEntry),
    Expired,
    Miss,
}

/// Bounded in-memory tier: LRU eviction at capacity, TTL checked on read.
pub(crate) struct MemoryTier {
    entries: LruCache<CacheDigest, CacheEntry>,
    evictions: u64,
}

impl MemoryTier {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            evictions: 0,
        }
    }

    pub(crate) fn get(&mut self, digest: &CacheDigest, now_ms: u64) -> Lookup {
        let expired = match self.entries.get(digest) {
            None => return Lookup::Miss,
            Some(entry) => entry.header.is_expired(now_ms),
        };
        if expired {
            self.entries.pop(digest);
            return Lookup::Expired;
        }
        match self.entries.get(digest) {
            Some(entry) => Lookup::Hit(entry.clone()),
            None => Lookup::Miss,
        }
    }

    pub(crate) fn insert(&mut self, digest: CacheDigest, entry: CacheEntry) {
        if let Some((evicted, _)) = self.entries.push(digest.clone(), entry) {
            if evicted != digest {
                self.evictions += 1;
            }
        }
    }

    pub(crate) fn remove(&mut self, digest: &CacheDigest) -> bool {
        self.entries.pop(digest).is_some()
    }

    /// Drop entries computed for `repo`; returns how many were dropped.
    pub(crate) fn remove_repo(&mut self, repo: &str) -> usize {
        let doomed: Vec<CacheDigest> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.header.repo == repo)
            .map(|(digest, _)| digest.clone())
            .collect();
        for digest in &doomed {
            self.entries.pop(digest);
        }
        doomed.len()
    }

    pub(crate) fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn evictions(&self) -> u64 {
        self.evictions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheKey;
    use serde_json::json;
    use std::time::Duration;

    fn entry(freshness: &str, ttl: Option<Duration>) -> (CacheDigest, CacheEntry) {
        let digest = CacheKey::new("op", "/repo", freshness).digest();
        let entry = CacheEntry::new(&digest, "op", "/repo", ttl, json!(freshness)).unwrap();
        (digest, entry)
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut tier = MemoryTier::new(2);
        let (a, ea) = entry("a", None);
        let (b, eb) = entry("b", None);
        let (c, ec) = entry("c", None);
        tier.insert(a.clone(), ea);
        tier.insert(b.clone(), eb);
        assert!(matches!(tier.get(&a, 0), Lookup::Hit(_)));
        tier.insert(c.clone(), ec);

        assert!(matches!(tier.get(&b, 0), Lookup::Miss));
        assert!(matches!(tier.get(&a, 0), Lookup::Hit(_)));
        assert!(matches!(tier.get(&c, 0), Lookup::Hit(_)));
        assert_eq!(tier.evictions(), 1);
    }

    #[test]
    fn expired_entries_are_removed_on_read() {
        let mut tier = MemoryTier::new(4);
        let (a, ea) = entry("a", Some(Duration::from_secs(1)));
        let created = ea.header.created_ms;
        tier.insert(a.clone(), ea);
        assert!(matches!(tier.get(&a, created + 5_000), Lookup::Expired));
        assert_eq!(tier.len(), 0);
    }
}
