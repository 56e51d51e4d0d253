use std::collections::BTreeSet;
use std::time::Duration;

pub const MAX_PAYLOAD_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_REPO_BYTES: u64 = 100 * 1024 * 1024;

/// Which operations are worth caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub max_payload_bytes: u64,
    pub max_repo_bytes: u64,
    /// Operations cached regardless of how long they took.
    pub allow_list: BTreeSet<String>,
    /// Anything slower than this is cached even when not allow-listed.
    pub min_exec: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            max_payload_bytes: MAX_PAYLOAD_BYTES,
            max_repo_bytes: MAX_REPO_BYTES,
            allow_list: BTreeSet::new(),
            min_exec: Duration::from_secs(2),
        }
    }
}

impl CachePolicy {
    /// Lookups are pointless for repositories too large to ever be stored.
    #[must_use]
    pub fn covers_repo(&self, repo_bytes: u64) -> bool {
        repo_bytes <= self.max_repo_bytes
    }

    #[must_use]
    pub fn allows(&self, operation: &str) -> bool {
        self.allow_list.contains(operation)
    }

    #[must_use]
    pub fn admits(
        &self,
        operation: &str,
        payload_bytes: u64,
        repo_bytes: u64,
        exec: Duration,
    ) -> bool {
        payload_bytes <= self.max_payload_bytes
            && self.covers_repo(repo_bytes)
            && (self.allows(operation) || exec >= self.min_exec)
    }
}
