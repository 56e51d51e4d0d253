use crate::CacheDigest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const ENTRY_VERSION: u32 = 1;

/// Header written ahead of every payload; used for integrity, TTL and
/// path-scoped invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryHeader {
    pub version: u32,
    pub key: String,
    pub operation: String,
    /// Canonical repository path the entry was computed for.
    pub repo: String,
    pub created_ms: u64,
    /// `None` never expires.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    pub payload_bytes: u64,
    /// blake3 of the serialized payload.
    pub checksum: String,
}

impl EntryHeader {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.ttl_secs {
            Some(ttl) => now_ms.saturating_sub(self.created_ms) >= ttl.saturating_mul(1_000),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub header: EntryHeader,
    pub payload: Value,
}

impl CacheEntry {
    pub fn new(
        digest: &CacheDigest,
        operation: &str,
        repo: &str,
        ttl: Option<Duration>,
        payload: Value,
    ) -> crate::Result<Self> {
        let bytes = serde_json::to_vec(&payload)?;
        Ok(Self {
            header: EntryHeader {
                version: ENTRY_VERSION,
                key: digest.to_string(),
                operation: operation.to_string(),
                repo: repo.to_string(),
                created_ms: unix_ms_now(),
                ttl_secs: ttl.map(|t| t.as_secs()),
                payload_bytes: bytes.len() as u64,
                checksum: blake3::hash(&bytes).to_hex().to_string(),
            },
            payload,
        })
    }

    /// Header matches the requested key and the payload matches its checksum.
    pub fn verify(&self, digest: &CacheDigest) -> std::result::Result<(), String> {
        if self.header.version != ENTRY_VERSION {
            return Err(format!("unsupported entry version {}", self.header.version));
        }
        if self.header.key != digest.as_str() {
            return Err("header key does not match entry name".to_string());
        }
        let bytes = serde_json::to_vec(&self.payload).map_err(|e| e.to_string())?;
        if blake3::hash(&bytes).to_hex().as_str() != self.header.checksum {
            return Err("payload checksum mismatch".to_string());
        }
        Ok(())
    }
}

pub(crate) fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheKey;
    use serde_json::json;

    #[test]
    fn verify_detects_tampering() {
        let digest = CacheKey::new("op", "/repo", "abc").digest();
        let mut entry = CacheEntry::new(&digest, "op", "/repo", None, json!({"a": 1})).unwrap();
        assert!(entry.verify(&digest).is_ok());

        let other = CacheKey::new("op", "/repo", "def").digest();
        assert!(entry.verify(&other).is_err());

        entry.payload = json!({"a": 2});
        assert!(entry.verify(&digest).is_err());
    }

    #[test]
    fn ttl_is_inclusive() {
        let digest = CacheKey::new("op", "/repo", "abc").digest();
        let entry = CacheEntry::new(
            &digest,
            "op",
            "/repo",
            Some(Duration::from_secs(10)),
            json!(null),
        )
        .unwrap();
        let created = entry.header.created_ms;
        assert!(!entry.header.is_expired(created + 9_999));
        assert!(entry.header.is_expired(created + 10_000));
    }
}
