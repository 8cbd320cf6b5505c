//! Error types shared by every engine, codec and driver in the crate.
//!
//! All fallible operations return [`Result`]. Each [`FtsError`] maps onto one
//! [`ErrorKind`] so that a benchmarking harness can decide between retrying and
//! aborting without caring which driver produced the error.

use std::io;

use thiserror::Error;

/// Coarse classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown driver, malformed option or otherwise unusable configuration.
    Configuration,
    /// Document source, disk or network failure. Retrying may succeed.
    Io,
    /// The caller cancelled the operation.
    Cancelled,
    /// A stored structure or a backend response could not be decoded.
    Format,
    /// Anything else.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Io => "io",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Format => "format",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum FtsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Corrupt index: {0}")]
    Corrupt(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Document source error: {0}")]
    Source(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Driver is closed: {0}")]
    Closed(String),

    #[error("{driver} backend error ({kind}): {message}")]
    Backend {
        driver: String,
        kind: ErrorKind,
        message: String,
    },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, FtsError>;

impl FtsError {
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        FtsError::InvalidConfig(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        FtsError::InvalidArgument(msg.into())
    }

    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        FtsError::Corrupt(msg.into())
    }

    pub fn index<S: Into<String>>(msg: S) -> Self {
        FtsError::Index(msg.into())
    }

    pub fn source<S: Into<String>>(msg: S) -> Self {
        FtsError::Source(msg.into())
    }

    pub fn other<S: Into<String>>(msg: S) -> Self {
        FtsError::Other(msg.into())
    }

    pub fn backend<D: Into<String>, S: Into<String>>(driver: D, kind: ErrorKind, msg: S) -> Self {
        FtsError::Backend {
            driver: driver.into(),
            kind,
            message: msg.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FtsError::Io(_) | FtsError::Source(_) | FtsError::Timeout(_) => ErrorKind::Io,
            FtsError::Json(_) | FtsError::Corrupt(_) => ErrorKind::Format,
            FtsError::UnknownDriver(_)
            | FtsError::InvalidConfig(_)
            | FtsError::InvalidArgument(_) => ErrorKind::Configuration,
            FtsError::Cancelled => ErrorKind::Cancelled,
            FtsError::Backend { kind, .. } => *kind,
            FtsError::Index(_) | FtsError::Closed(_) | FtsError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Io
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FtsError::Cancelled)
    }
}
