//! # Codecity Orchestrator
//!
//! Runs the configured adapters over one repository and turns their output
//! into a correlated, projected run document.
//!
//! ```text
//! RunConfig (TOML) + AdapterRegistry ──validate──> Orchestrator
//!     │
//!     └──> run(root, cancel)
//!             ├──> RepositoryLoader          files, commit, branch
//!             ├──> StateStore                delta base, changed paths
//!             ├──> WorkerPool (declaration order)
//!             │       └──> per adapter: probe ─> cache ─> analyze ─> normalize
//!             │            bounded by adapter timeout, run deadline, budget
//!             ├──> AnalysisBundle ─> CorrelationEngine ─> project()
//!             ├──> RunDocument
//!             └──> StateStore::mark_analyzed (once)
//! ```
//!
//! Adapter failures never leave their [`codecity_model::AdapterResult`]. A
//! run aborts only on a configuration error or when the caller cancels.

mod config;
mod document;
mod error;
mod limits;
mod pipeline;
mod runner;
mod scratch;

pub use config::{
    AdapterConfig, CacheSection, Environment, RunConfig, DEFAULT_ADAPTER_TIMEOUT_SECS,
    DEFAULT_CACHE_TTL_SECS, DEFAULT_GRACE_SECS, DEFAULT_RUN_DEADLINE_SECS,
};
pub use document::{
    run_document_schema, weighted_density, AdapterBlock, AdapterLine, Aggregate, Rating,
    RepositoryInfo, RunDocument, RunSummary,
};
pub use error::{OrchestratorError, Result};
pub use limits::{default_concurrency, parse_concurrency, PoolSnapshot, WorkerPool, MAX_CONCURRENCY};
pub use pipeline::{Orchestrator, RunOutcome};
pub use runner::AdapterInstance;
pub use scratch::ScratchSpace;
