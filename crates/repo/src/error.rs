use thiserror::Error;

pub type Result<T> = std::result::Result<T, RepoError>;

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid repository path: {0}")]
    InvalidPath(String),

    #[error("Invalid classification pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("{0}")]
    Other(String),
}
