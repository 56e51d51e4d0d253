use thiserror::Error;

pub type Result<T> = std::result::Result<T, NormalizeError>;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("empty path")]
    EmptyPath,

    #[error("path escapes the repository root: {0}")]
    OutsideRoot(String),

    #[error("unresolvable path {path}: {reason}")]
    Unresolvable { path: String, reason: String },

    #[error("native output does not match the accepted schema: {0}")]
    Schema(String),
}
