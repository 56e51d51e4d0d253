//! # Codecity Incremental
//!
//! Remembers the last analyzed commit per repository so delta-capable
//! adapters can bound their work.
//!
//! ```text
//! <repo>/.git/codecity/state.json   (or <repo>/.codecity/state.json)
//!     │
//!     ├──> last_analyzed() / first_run()   read, corrupt => absent
//!     ├──> mark_analyzed(commit, meta)     lock + temp + rename
//!     └──> clear()                         next run is a full pass
//! ```

mod error;
mod lock;
mod marker;
mod store;

pub use error::{Result, StateError};
pub use marker::{AdapterMark, IncrementalMarker, MarkMetadata, MARKER_VERSION, STATE_KEY};
pub use store::{marker_path_for_root, StateStore};
