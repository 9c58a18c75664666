use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Tokenizer unavailable: {0}")]
    TokenizerUnavailable(String),

    #[error("Previous snapshot is not comparable: {0}")]
    IncomparableSnapshot(String),

    #[error("Invalid project path: {0}")]
    InvalidPath(String),

    #[error("Version control unavailable: {0}")]
    VcsUnavailable(String),

    #[error("{0}")]
    Other(String),
}

impl ScanError {
    /// Errors raised before any work starts because the requested setup cannot run.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ScanError::Configuration(_)
                | ScanError::TokenizerUnavailable(_)
                | ScanError::IncomparableSnapshot(_)
                | ScanError::InvalidPath(_)
        )
    }
}

/// Failure of a single tokenization call. Never escalates past the file it belongs to.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct TokenizeError(pub String);

/// Change listing failures.
#[derive(Error, Debug)]
pub enum ChangeError {
    /// No git binary or no repository at the root; callers should fall back to full scans.
    #[error("Version control unavailable: {0}")]
    Unavailable(String),

    #[error("git command failed: {0}")]
    CommandFailed(String),

    #[error("git command timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<ChangeError> for ScanError {
    fn from(err: ChangeError) -> Self {
        match err {
            ChangeError::Unavailable(msg) => ScanError::VcsUnavailable(msg),
            ChangeError::IoError(err) => ScanError::IoError(err),
            other => ScanError::Other(other.to_string()),
        }
    }
}
