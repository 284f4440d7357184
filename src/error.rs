//! Unified error type for history ingestion and diff queries.

use thiserror::Error;

/// All errors that can surface from a repository session.
///
/// Parsing anomalies never show up here: malformed diff lines and log records are
/// skipped where they are found. Only transport and lifecycle problems propagate.
#[derive(Error, Debug)]
pub enum RevCacheError {
    /// I/O error (pipe read, file access)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output encoding failed
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The git binary could not be started
    #[error("Failed to execute {program}: {source}. Is git installed and in PATH?")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// git ran but exited unsuccessfully
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// The run was terminated by a cancel signal
    #[error("git {command} was cancelled")]
    Cancelled { command: String },

    /// Directory is not inside a git work tree
    #[error("Not a git repository: {0}")]
    NotARepository(String),

    /// A streamed history load is already running for this session
    #[error("A repository load is already in progress")]
    LoadInProgress,

    /// A streamed history load ended unsuccessfully
    #[error("History load failed after {commits} commits: {message}")]
    LoadFailed { commits: usize, message: String },

    /// A revision argument did not name a commit
    #[error("Unknown revision: {0}")]
    UnknownRevision(String),
}

impl RevCacheError {
    /// True when the error came from a cancel signal rather than a real failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RevCacheError::Cancelled { .. })
    }
}
