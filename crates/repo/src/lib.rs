//! # Codecity Repo
//!
//! Repository discovery: the read-only [`Repository`](codecity_model::Repository)
//! view every adapter shares during a run.
//!
//! ```text
//! root
//!   │
//!   ├──> git probes (HEAD, branch, dirtiness; bounded by timeouts)
//!   │
//!   └──> FileScanner (.gitignore aware)
//!          └─> FileClassifier (language + category) ──> RepoFile
//! ```

mod classify;
mod error;
mod git;
mod loader;
mod scanner;

pub use classify::FileClassifier;
pub use error::{RepoError, Result};
pub use git::{changed_paths_between, probe_git_state, GitState};
pub use loader::RepositoryLoader;
pub use scanner::{FileScanner, ScannedFile};
