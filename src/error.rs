use thiserror::Error;

#[derive(Error, Debug)]
pub enum XgitError {
    #[error("unauthorized: token missing or rejected")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("github error: {0}")]
    GitHub(String),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("not signed in")]
    NotSignedIn,

    #[error("no repository open")]
    NoRepository,

    #[error("file not open: {0}")]
    FileNotOpen(String),

    #[error("no pending change for {0}")]
    NotDirty(String),

    #[error("commit message is empty")]
    EmptyMessage,

    #[error("cannot decode content of {0}")]
    Decode(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("editor error: {0}")]
    Editor(String),
}

impl XgitError {
    // A conflict can be retried after rebasing onto the remote version.
    pub fn is_retryable(&self) -> bool {
        matches!(self, XgitError::Network(_) | XgitError::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, XgitError>;
