use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StateError>;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Marker failed to parse. Treated as absent by readers.
    #[error("corrupt state file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("state lock error: {0}")]
    Lock(String),
}
