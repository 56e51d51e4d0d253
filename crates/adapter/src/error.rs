use codecity_model::ErrorKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AdapterError>;

/// Failures an adapter returns from `analyze`. The orchestrator records them
/// on the adapter result; they never cross the run boundary.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("missing configuration: {0}")]
    ConfigMissing(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("external tool failed: {0}")]
    External(String),

    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl AdapterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Unavailable(_) => ErrorKind::Unavailable,
            AdapterError::ConfigMissing(_) => ErrorKind::ConfigMissing,
            AdapterError::Timeout(_) => ErrorKind::Timeout,
            AdapterError::Cancelled => ErrorKind::Cancelled,
            AdapterError::External(_) | AdapterError::IoError(_) | AdapterError::JsonError(_) => {
                ErrorKind::ExternalError
            }
        }
    }
}

/// Option bag rejected against an adapter's declared schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    #[error("unknown option {key:?}")]
    Unknown { key: String },

    #[error("missing required option {key:?}")]
    Missing { key: String },

    #[error("option {key:?} must be {expected}")]
    Mismatch { key: String, expected: &'static str },
}
