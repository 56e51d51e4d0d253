use blake3::Hasher;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Inputs that identify one cacheable operation.
///
/// The digest covers the operation name, the canonical repository path, the
/// options (key-sorted, values canonically serialized) and the freshness
/// token of the tree (commit, or mtime fingerprint for non-git trees).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheKey {
    pub operation: String,
    pub repo: String,
    pub options: BTreeMap<String, Value>,
    pub freshness: String,
}

impl CacheKey {
    pub fn new(
        operation: impl Into<String>,
        repo: impl Into<String>,
        freshness: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            repo: repo.into(),
            options: BTreeMap::new(),
            freshness: freshness.into(),
        }
    }

    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn options(mut self, options: &BTreeMap<String, Value>) -> Self {
        self.options
            .extend(options.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// 256-bit blake3 digest, hex encoded.
    #[must_use]
    pub fn digest(&self) -> CacheDigest {
        let mut hasher = Hasher::new();
        for part in [&self.operation, &self.repo, &self.freshness] {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        for (key, value) in &self.options {
            hasher.update(b"|");
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(canonical_json(value).as_bytes());
        }
        CacheDigest(hasher.finalize().to_hex().to_string())
    }
}

/// Object key order depends on serde_json's `preserve_order` feature, so
/// objects are re-sorted before hashing.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, String> =
                map.iter().map(|(k, v)| (k, canonical_json(v))).collect();
            let body: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{v}", Value::String(k.clone())))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheDigest(String);

impl CacheDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts only a well-formed hex digest, e.g. a cache file stem.
    pub fn parse(raw: &str) -> Option<Self> {
        (raw.len() == 64 && raw.bytes().all(|b| b.is_ascii_hexdigit()))
            .then(|| Self(raw.to_ascii_lowercase()))
    }
}

impl fmt::Display for CacheDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
