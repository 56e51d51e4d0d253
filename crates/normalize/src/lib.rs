//! # Codecity Normalize
//!
//! The membrane between adapter-native output and the unified model.
//!
//! ```text
//! NativeOutput (records | SARIF | verification documents)
//!     │
//!     ├──> family Normalizer ──> DraftFinding (native severity mapped, raw path)
//!     │
//!     ├──> PathCanonicalizer (mounts, URIs, `..`, symlinks; root-relative)
//!     │
//!     └──> finding_id + validate_finding ──> Finding (or a counter increment)
//! ```

mod canonicalize;
mod error;
mod native;
mod normalizer;
mod pipeline;
mod severity_map;

pub use canonicalize::{uri_to_path, MountMapping, PathCanonicalizer, ResolvedPath};
pub use error::{NormalizeError, Result};
pub use native::{
    NativeMetric, NativeOutput, NativePayload, NativeRecord, PropertyRecord, VerificationDocument,
};
pub use normalizer::{
    DraftFinding, Drafts, Normalizer, RecordNormalizer, SarifNormalizer, VerificationNormalizer,
};
pub use pipeline::{FindingNormalizer, Normalized};
pub use severity_map::{NativeSeverity, SeverityScheme};
