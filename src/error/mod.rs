//! Error types and Result aliases for dbxignore.
//!
//! Only setup failures and cancellation ever leave a component as an
//! `Err`. Per-entry failures during a walk or a flush are logged where they
//! happen and never surface here.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using dbxignore's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dbxignore operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Ignore-file matching error.
    #[error("matcher error: {0}")]
    Matcher(#[from] MatcherError),

    /// Extended attribute error.
    #[error("attribute error: {0}")]
    Attribute(#[from] AttributeError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The OS notification backend could not be created.
    #[error("failed to initialise notification backend: {0}")]
    Init(String),

    /// Failed to watch path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// The watcher has been closed.
    #[error("watcher is closed")]
    Closed,

    /// `run` was called while another `run` still owns the event channels.
    #[error("watcher event loop is already running")]
    AlreadyRunning,
}

/// Ignore-file matching errors.
#[derive(Error, Debug)]
pub enum MatcherError {
    /// The ignore file could not be read.
    #[error("failed to read ignore file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The ignore file contains a pattern that does not compile.
    #[error("invalid pattern in '{}': {reason}", path.display())]
    InvalidPattern { path: PathBuf, reason: String },
}

/// Extended attribute errors.
#[derive(Error, Debug)]
pub enum AttributeError {
    /// The platform call failed.
    #[error("{op} failed for '{}': {source}", path.display())]
    Os {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    /// The path contains an interior NUL byte.
    #[error("path contains a NUL byte: '{}'", .0.display())]
    InvalidPath(PathBuf),

    /// Tagging is not implemented for this platform.
    #[error("extended attributes are not supported on this platform")]
    Unsupported,
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is the cancellation signal rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl WatcherError {
    /// Create a watch-failed error for a path.
    pub fn watch_failed(path: &std::path::Path, reason: impl ToString) -> Self {
        Self::WatchFailed {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}
