use crate::disk::{DiskTier, DiskUsage};
use crate::entry::unix_ms_now;
use crate::memory::{Lookup, MemoryTier};
use crate::{CacheEntry, CacheError, CacheKey, CachePolicy, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    /// `None` keeps the cache memory-only.
    pub dir: Option<PathBuf>,
    pub ttl: Option<Duration>,
    pub memory_capacity: usize,
    /// Advisory upper bound on disk entries; oldest are pruned past it.
    pub max_disk_entries: Option<usize>,
    pub policy: CachePolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            ttl: Some(Duration::from_secs(86_400)),
            memory_capacity: 256,
            max_disk_entries: Some(10_000),
            policy: CachePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Overrides the configured TTL.
    pub ttl: Option<Duration>,
    pub persist: bool,
}

impl SetOptions {
    pub fn persistent() -> Self {
        Self {
            ttl: None,
            persist: true,
        }
    }
}

/// Counters since construction. Hits are only counted for entries that
/// passed the expiry and integrity checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub expired: u64,
    pub corrupt: u64,
    pub evictions: u64,
    pub memory_entries: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    expired: AtomicU64,
    corrupt: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Two-tier cache shared by reference across one run. The memory tier sits
/// behind a single-writer lock; disk entries are replaced atomically.
pub struct CacheLayer {
    config: CacheConfig,
    memory: Mutex<MemoryTier>,
    disk: Option<DiskTier>,
    counters: Counters,
}

impl CacheLayer {
    pub fn new(config: CacheConfig) -> Self {
        let disk = config.dir.clone().map(DiskTier::new);
        Self {
            memory: Mutex::new(MemoryTier::new(config.memory_capacity)),
            disk,
            counters: Counters::default(),
            config,
        }
    }

    pub fn disabled() -> Self {
        Self::new(CacheConfig {
            enabled: false,
            dir: None,
            ..CacheConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.config.policy
    }

    pub fn dir(&self) -> Option<&std::path::Path> {
        self.disk.as_ref().map(DiskTier::dir)
    }

    fn memory(&self) -> MutexGuard<'_, MemoryTier> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Probe memory, then disk. Expired and corrupt entries are removed.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        let digest = key.digest();
        let now = unix_ms_now();

        let memory_lookup = self.memory().get(&digest, now);
        match memory_lookup {
            Lookup::Hit(entry) => match serde_json::from_value::<T>(entry.payload) {
                Ok(value) => {
                    bump(&self.counters.hits);
                    bump(&self.counters.memory_hits);
                    return Some(value);
                }
                Err(e) => {
                    log::debug!("Discarding cache entry {digest} of unexpected shape: {e}");
                    bump(&self.counters.corrupt);
                    self.memory().remove(&digest);
                }
            },
            Lookup::Expired => bump(&self.counters.expired),
            Lookup::Miss => {}
        }

        if let Some(disk) = &self.disk {
            match disk.read(&digest).await {
                Ok(Some(entry)) if entry.header.is_expired(now) => {
                    bump(&self.counters.expired);
                    let _ = disk.remove(&digest).await;
                }
                Ok(Some(entry)) => match serde_json::from_value::<T>(entry.payload.clone()) {
                    Ok(value) => {
                        bump(&self.counters.hits);
                        bump(&self.counters.disk_hits);
                        self.memory().insert(digest, entry);
                        return Some(value);
                    }
                    Err(e) => {
                        log::debug!("Discarding cache entry {digest} of unexpected shape: {e}");
                        bump(&self.counters.corrupt);
                        let _ = disk.remove(&digest).await;
                    }
                },
                Ok(None) => {}
                Err(CacheError::Corrupt { path, reason }) => {
                    log::debug!("Discarding corrupt cache entry {}: {reason}", path.display());
                    bump(&self.counters.corrupt);
                    let _ = disk.remove(&digest).await;
                }
                Err(e) => log::debug!("Cache read failed for {digest}: {e}"),
            }
        }

        bump(&self.counters.misses);
        None
    }

    /// Always writes memory; writes disk only with `persist` and a cache
    /// directory. Returns `false` when the payload exceeds the size limit.
    pub async fn set<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        options: SetOptions,
    ) -> Result<bool> {
        if !self.config.enabled {
            return Ok(false);
        }
        let digest = key.digest();
        let payload = serde_json::to_value(value)?;
        let ttl = options.ttl.or(self.config.ttl);
        let entry = CacheEntry::new(&digest, &key.operation, &key.repo, ttl, payload)?;
        if entry.header.payload_bytes > self.config.policy.max_payload_bytes {
            log::debug!(
                "Not caching {} ({} bytes over limit)",
                key.operation,
                entry.header.payload_bytes
            );
            return Ok(false);
        }

        if options.persist {
            if let Some(disk) = &self.disk {
                disk.write(&digest, &entry).await?;
                if let Some(max) = self.config.max_disk_entries {
                    let pruned = disk.prune(max)?;
                    if pruned > 0 {
                        log::debug!("Pruned {pruned} cache entries past the {max} entry bound");
                    }
                }
            }
        }
        self.memory().insert(digest, entry);
        bump(&self.counters.writes);
        Ok(true)
    }

    /// Drop every entry computed for `repo` from both tiers.
    pub fn invalidate_repo(&self, repo: &str) -> Result<usize> {
        let mut removed = self.memory().remove_repo(repo);
        if let Some(disk) = &self.disk {
            removed += disk.remove_repo(repo)?;
        }
        log::info!("Invalidated {removed} cache entries for {repo}");
        Ok(removed)
    }

    pub fn clear(&self) -> Result<usize> {
        let mut removed = self.memory().clear();
        if let Some(disk) = &self.disk {
            removed += disk.clear()?;
        }
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let memory = self.memory();
        CacheStats {
            hits: load(&self.counters.hits),
            memory_hits: load(&self.counters.memory_hits),
            disk_hits: load(&self.counters.disk_hits),
            misses: load(&self.counters.misses),
            writes: load(&self.counters.writes),
            expired: load(&self.counters.expired),
            corrupt: load(&self.counters.corrupt),
            evictions: memory.evictions(),
            memory_entries: memory.len(),
        }
    }

    pub fn disk_usage(&self) -> Result<DiskUsage> {
        match &self.disk {
            Some(disk) => disk.usage(),
            None => Ok(DiskUsage::default()),
        }
    }
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("enabled", &self.config.enabled)
            .field("dir", &self.config.dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    fn layer(dir: Option<PathBuf>) -> CacheLayer {
        CacheLayer::new(CacheConfig {
            dir,
            ..CacheConfig::default()
        })
    }

    #[tokio::test]
    async fn memory_round_trip_counts_hits_and_misses() {
        let cache = layer(None);
        let key = CacheKey::new("op", "/repo", "abc");
        assert_eq!(cache.get::<Vec<u32>>(&key).await, None);
        assert!(cache.set(&key, &vec![1u32, 2], SetOptions::default()).await.unwrap());
        assert_eq!(cache.get::<Vec<u32>>(&key).await, Some(vec![1, 2]));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.memory_hits, stats.misses), (1, 1, 1));
    }

    #[tokio::test]
    async fn disk_tier_survives_a_new_layer() {
        let dir = tempdir().unwrap();
        let key = CacheKey::new("op", "/repo", "abc").option("x", json!(1));
        layer(Some(dir.path().to_path_buf()))
            .set(&key, &"payload", SetOptions::persistent())
            .await
            .unwrap();

        let fresh = layer(Some(dir.path().to_path_buf()));
        assert_eq!(fresh.get::<String>(&key).await.as_deref(), Some("payload"));
        assert_eq!(fresh.stats().disk_hits, 1);
        // promoted to memory
        assert_eq!(fresh.get::<String>(&key).await.as_deref(), Some("payload"));
        assert_eq!(fresh.stats().memory_hits, 1);
    }

    #[tokio::test]
    async fn non_persistent_set_skips_disk() {
        let dir = tempdir().unwrap();
        let cache = layer(Some(dir.path().to_path_buf()));
        let key = CacheKey::new("op", "/repo", "abc");
        cache.set(&key, &1u8, SetOptions::default()).await.unwrap();
        assert_eq!(cache.disk_usage().unwrap().entries, 0);
    }

    #[tokio::test]
    async fn expired_entries_are_not_hits() {
        let dir = tempdir().unwrap();
        let cache = layer(Some(dir.path().to_path_buf()));
        let key = CacheKey::new("op", "/repo", "abc");
        let options = SetOptions {
            ttl: Some(Duration::ZERO),
            persist: true,
        };
        cache.set(&key, &1u8, options).await.unwrap();
        assert_eq!(cache.get::<u8>(&key).await, None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.expired, 2);
        assert_eq!(cache.disk_usage().unwrap().entries, 0);
    }

    #[tokio::test]
    async fn corrupt_disk_entry_is_discarded() {
        let dir = tempdir().unwrap();
        let cache = layer(Some(dir.path().to_path_buf()));
        let key = CacheKey::new("op", "/repo", "abc");
        std::fs::write(dir.path().join(format!("{}.json", key.digest())), b"garbage").unwrap();

        assert_eq!(cache.get::<u8>(&key).await, None);
        assert_eq!(cache.stats().corrupt, 1);
        assert_eq!(cache.disk_usage().unwrap().entries, 0);
    }

    #[tokio::test]
    async fn disabled_cache_never_stores() {
        let cache = CacheLayer::disabled();
        let key = CacheKey::new("op", "/repo", "abc");
        assert!(!cache.set(&key, &1u8, SetOptions::default()).await.unwrap());
        assert_eq!(cache.get::<u8>(&key).await, None);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[tokio::test]
    async fn invalidate_repo_clears_both_tiers() {
        let dir = tempdir().unwrap();
        let cache = layer(Some(dir.path().to_path_buf()));
        let a = CacheKey::new("op", "/a", "1");
        let b = CacheKey::new("op", "/b", "1");
        cache.set(&a, &1u8, SetOptions::persistent()).await.unwrap();
        cache.set(&b, &2u8, SetOptions::persistent()).await.unwrap();

        assert_eq!(cache.invalidate_repo("/a").unwrap(), 2);
        assert_eq!(cache.get::<u8>(&a).await, None);
        assert_eq!(cache.get::<u8>(&b).await, Some(2));
    }
}
