//! Session error types.

use pilot_core::{Classify, ErrorKind, WindowId};
use thiserror::Error;

/// Why an endpoint's chain id could not be determined.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Transport failure.
    #[error("probe request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The endpoint answered with a non-success status.
    #[error("endpoint returned HTTP {0}")]
    Status(u16),
    /// The endpoint answered with a JSON-RPC error.
    #[error("endpoint returned RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },
    /// The response could not be understood.
    #[error("malformed probe response: {0}")]
    Malformed(String),
    /// No answer within the configured bound.
    #[error("probe timed out after {0}ms")]
    Timeout(u64),
}

impl Classify for ProbeError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ProbeFailure
    }
}

/// Failure reported by a host sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The host refused the request.
    #[error("host rejected request: {0}")]
    Rejected(String),
    /// The host is gone (window closed, extension reloading).
    #[error("host unavailable")]
    Unavailable,
}

impl Classify for SinkError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Host
    }
}

/// Errors returned by session and fork operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `create_fork` on a session that already has one.
    #[error("window {0} is already forked")]
    AlreadyForked(WindowId),
    /// Fork operation on a session without a fork.
    #[error("window {0} is not forked")]
    NotForked(WindowId),
    /// No session for the window.
    #[error("no session for window {0}")]
    SessionNotFound(WindowId),
    /// Installing rules failed.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl SessionError {
    /// Error category string for logs.
    pub fn category(&self) -> &str {
        match self {
            Self::AlreadyForked(_) => "already_forked",
            Self::NotForked(_) => "not_forked",
            Self::SessionNotFound(_) => "session_not_found",
            Self::Sink(_) => "sink",
        }
    }
}

impl Classify for SessionError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyForked(_) | Self::NotForked(_) | Self::SessionNotFound(_) => {
                ErrorKind::InvariantViolation
            }
            Self::Sink(e) => e.kind(),
        }
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
