//! Error types for the bulkops engine
//!
//! Item failures and throttling are encoded in [`OperationState`](crate::job::OperationState)
//! and never surface here. The variants below are what control-surface callers
//! receive synchronously, plus the plumbing errors of stores and registrars.

use crate::job::{JobKind, JobStatus};
use thiserror::Error;

/// Result type alias for bulkops operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the bulkops engine
#[derive(Error, Debug)]
pub enum Error {
    /// A job of this kind is already running or paused on a rate limit
    #[error("A {kind} job is already active ({status})")]
    Conflict {
        /// Kind of the active job
        kind: JobKind,
        /// Status of the active job
        status: JobStatus,
    },

    /// No job of this kind has ever run
    #[error("No {0} job has run yet")]
    NotFound(JobKind),

    /// Control request incompatible with the current status
    #[error("Cannot {action} {kind} job in status {status}: {reason}")]
    InvalidState {
        /// Kind of the job
        kind: JobKind,
        /// Current status of the job
        status: JobStatus,
        /// Requested action (e.g. "resume")
        action: &'static str,
        /// Why the request was refused
        reason: String,
    },

    /// Malformed input or unrecoverable fault; the job ends in `error`
    #[error("Fatal error: {0}")]
    Fatal(String),

    /// The registrar throttled this call
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The registrar rejected the change for one item
    #[error("Registrar error ({registrar}): {message}")]
    Registrar {
        /// Registrar name
        registrar: String,
        /// Error message
        message: String,
    },

    /// Invalid request parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Job store errors
    #[error("Job store error: {0}")]
    StateStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a fatal error
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a registrar error
    pub fn registrar(registrar: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Registrar {
            registrar: registrar.into(),
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a job store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(
        kind: JobKind,
        status: JobStatus,
        action: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            kind,
            status,
            action,
            reason: reason.into(),
        }
    }

    /// Whether this error is the registrar's throttling signal
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
