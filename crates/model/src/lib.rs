//! # Codecity Model
//!
//! Unified data model shared by every stage of the aggregation pipeline.
//!
//! ## Flow
//!
//! ```text
//! Adapter output
//!     │
//!     ├──> Normalizer ──> Finding / Metric (canonical severity, category, location)
//!     │
//!     ├──> AdapterResult (status, counters, findings in adapter order)
//!     │
//!     └──> AnalysisBundle (run metadata + per-adapter results, declaration order)
//! ```
//!
//! Every file-bearing [`Finding`] names a canonical, repository-relative,
//! forward-slash path that is present in [`Repository::files`]; repo-scope
//! findings carry `location.file = None`. [`validate_finding`] enforces this.

mod error;
mod finding;
mod language;
mod repository;
mod run;
mod severity;
mod validate;

pub use error::{ModelError, Result};
pub use finding::{
    finding_id, Entity, EntityKind, EntityRef, Finding, FindingKind, Location, Metric,
    MetricScope, Verdict,
};
pub use language::Language;
pub use repository::{FileCategory, RepoFile, RepoFingerprint, Repository, Vcs};
pub use run::{
    AdapterCounters, AdapterFailure, AdapterResult, AdapterStatus, AnalysisBundle, AnalysisRun,
    AvailabilityReport, BundleTotals, ErrorKind, RunStatus,
};
pub use severity::{Category, Confidence, Severity};
pub use validate::{is_canonical_path, validate_finding};

/// Version stamped at the root of every serialized run document.
pub const SCHEMA_VERSION: &str = "1.0";
