//! Stage failure taxonomy.
//!
//! Every collaborator call resolves to a [`StageResult`]; the orchestrator
//! converts a [`StageError`] into the job's terminal `failed` state, carrying
//! the [`FailureKind`] so clients can tell a retryable outage from an input
//! problem.

use std::fmt;

use lectern_core::FailureKind;

/// A typed failure raised by a stage executor.
#[derive(Debug, Clone)]
pub struct StageError {
    /// Whether a retry is worth attempting.
    pub kind: FailureKind,
    /// Human-readable description, surfaced as the job's `error_message`.
    pub message: String,
}

impl StageError {
    /// A failure likely to succeed on retry (network, rate limit, busy
    /// encoder).
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    /// A failure that will recur with the same input (malformed document,
    /// unsupported format).
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Fatal,
            message: message.into(),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl std::error::Error for StageError {}

impl From<std::io::Error> for StageError {
    fn from(e: std::io::Error) -> Self {
        StageError::transient(format!("io error: {e}"))
    }
}

/// Result alias for stage executor calls.
pub type StageResult<T> = std::result::Result<T, StageError>;
