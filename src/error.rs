use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// 404 from the publication API.
    #[error("Remote resource not found: {0}")]
    RemoteNotFound(String),

    /// 429 from the publication API. Retried by the client; only escapes
    /// when a caller bypasses the retry loop.
    #[error("Remote API throttled the request: {0}")]
    RemoteThrottled(String),

    #[error("Remote API error: {0}")]
    RemoteFailure(String),

    #[error("Database error: {0}")]
    PersistenceFailure(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid window format: {0}")]
    WindowParse(String),

    #[error("Unexpected payload: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Entity not found: {0}")]
    NotFound(String),
}

impl Error {
    /// True for failures that should skip a single item rather than abort a batch.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::RemoteNotFound(_) | Error::NotFound(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::PersistenceFailure(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::PersistenceFailure(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::RemoteFailure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
