use codecity_adapter::OptionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Failures that abort a run. Everything adapter-local is captured into the
/// adapter's result instead.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("adapter {adapter:?}: {source}")]
    InvalidOptions {
        adapter: String,
        #[source]
        source: OptionError,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error("repository error: {0}")]
    Repo(#[from] codecity_repo::RepoError),

    #[error("path canonicalization error: {0}")]
    Normalize(#[from] codecity_normalize::NormalizeError),

    #[error("state error: {0}")]
    State(#[from] codecity_incremental::StateError),

    #[error("cache error: {0}")]
    Cache(#[from] codecity_cache::CacheError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl OrchestratorError {
    pub fn config(message: impl Into<String>) -> Self {
        OrchestratorError::Config(message.into())
    }

    /// Raised before any adapter started.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Config(_)
                | OrchestratorError::InvalidOptions { .. }
                | OrchestratorError::Toml(_)
        )
    }
}
