//! Error types for cassie operations

use std::fmt;
use thiserror::Error;

use crate::transport::TransportError;

/// Result type for cassie operations
pub type CassieResult<T> = Result<T, CassieError>;

/// Error code recorded on a session after every operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorCode {
    /// The last operation succeeded
    #[default]
    None,
    /// The store rejected the request (unknown keyspace, schema mismatch, ...)
    InvalidRequest,
    /// Connection, framing or I/O failure
    Transport,
    /// Anything else
    Other,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::None => "none",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::Transport => "transport",
            ErrorCode::Other => "other",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failure a cassie operation can report
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CassieError {
    #[error("Invalid request: {why}")]
    InvalidRequest { why: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Exception {kind}: {message}")]
    Other { kind: String, message: String },
}

impl CassieError {
    /// Create a new invalid-request error
    pub fn invalid_request<S: Into<String>>(why: S) -> Self {
        Self::InvalidRequest { why: why.into() }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new error of another kind, tagged with the kind's name
    pub fn other<K: Into<String>, S: Into<String>>(kind: K, message: S) -> Self {
        Self::Other {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// The code this error is recorded under
    pub fn code(&self) -> ErrorCode {
        match self {
            CassieError::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            CassieError::Transport { .. } => ErrorCode::Transport,
            CassieError::Other { .. } => ErrorCode::Other,
        }
    }

    /// Check if this is a retriable error
    pub fn is_retriable(&self) -> bool {
        matches!(self, CassieError::Transport { .. })
    }

    /// Get the error category for monitoring/metrics
    pub fn category(&self) -> &'static str {
        self.code().as_str()
    }
}

impl From<TransportError> for CassieError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::InvalidRequest { why } => CassieError::InvalidRequest { why },
            TransportError::Transport { message } => CassieError::Transport { message },
            TransportError::Other { kind, message } => CassieError::Other { kind, message },
            // Callers that treat a miss as a value intercept this before converting
            TransportError::NotFound => CassieError::other("NotFoundException", "not found"),
        }
    }
}

/// The per-session record of the last operation's outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorState {
    last: Option<CassieError>,
}

impl ErrorState {
    /// Record the outcome of an operation, replacing whatever was there
    pub fn record<T>(&mut self, result: &CassieResult<T>) {
        self.last = result.as_ref().err().cloned();
    }

    pub fn clear(&mut self) {
        self.last = None;
    }

    pub fn set(&mut self, err: CassieError) {
        self.last = Some(err);
    }

    pub fn error(&self) -> Option<&CassieError> {
        self.last.as_ref()
    }

    pub fn code(&self) -> ErrorCode {
        self.last.as_ref().map_or(ErrorCode::None, CassieError::code)
    }

    /// Human readable message, `None` when the last operation succeeded
    pub fn message(&self) -> Option<String> {
        self.last.as_ref().map(ToString::to_string)
    }
}
