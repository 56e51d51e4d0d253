//! # Codecity Adapter
//!
//! The contract every analyzer integration implements, plus the adapters
//! shipped with the platform.
//!
//! ```text
//! AdapterRegistry (type id -> constructor)
//!     │
//!     ├──> describe()      static descriptor + option schema
//!     ├──> probe()         availability, never fails
//!     ├──> analyze(ctx)    NativeOutput, bounded by ctx.cancel / ctx.deadline
//!     └──> capabilities()  what the output populates
//! ```
//!
//! External binaries run through [`run_bounded`]: scrubbed environment,
//! scratch working directory, SIGTERM then SIGKILL on cancellation.

pub mod builtin;
mod contract;
mod error;
mod process;
mod registry;

pub use builtin::{CommandAdapter, GitHistoryAdapter, SarifAdapter, VerificationReportAdapter};
pub use contract::{
    Adapter, AdapterDescriptor, AdapterKind, AdapterOptions, Capabilities, OptionKind,
    OptionSpec, RepoContext,
};
pub use error::{AdapterError, OptionError, Result};
pub use process::{find_program, run_bounded, ProcessOutput, ProcessSpec};
pub use registry::{AdapterConstructor, AdapterRegistry};
