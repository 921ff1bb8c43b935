use thiserror::Error;

use crate::transaction::Epoch;

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{what} not found: '{path}'")]
    NotFound { what: &'static str, path: String },

    #[error("Stale handle: issued in {issued}, store is at {current}; re-resolve after commit")]
    StaleHandle { issued: Epoch, current: Epoch },

    #[error("Precondition violated: {0}")]
    PreconditionViolated(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl ManagerError {
    pub fn not_found(what: &'static str, path: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            path: path.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ManagerError>;

impl From<std::io::Error> for ManagerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ManagerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
