//! # Codecity Cache
//!
//! Tiered result cache governing whether an adapter re-runs.
//!
//! ```text
//! CacheKey { operation, repo, sorted options, freshness } ──blake3──> digest
//!     │
//!     ├──> memory tier (LRU, TTL)         hit ──> value
//!     │        miss / expired
//!     └──> disk tier (<dir>/<digest>.json, header + payload)
//!              hit ──> promote to memory ──> value
//! ```
//!
//! Corrupt entries (bad JSON, wrong key, checksum mismatch) are discarded and
//! counted; they never surface as errors on the read path.

mod disk;
mod entry;
mod error;
mod key;
mod layer;
mod memory;
mod policy;

pub use disk::DiskUsage;
pub use entry::{CacheEntry, EntryHeader, ENTRY_VERSION};
pub use error::{CacheError, Result};
pub use key::{CacheDigest, CacheKey};
pub use layer::{CacheConfig, CacheLayer, CacheStats, SetOptions};
pub use policy::{CachePolicy, MAX_PAYLOAD_BYTES, MAX_REPO_BYTES};
