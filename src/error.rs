//! Error taxonomy for the engine.
//!
//! Only [`ValidationError`] is ever returned to a caller of the translate and
//! batch operations. Backend and store failures are recovered inside the
//! orchestrator and surface as log lines and metrics. Approvals are writes, so
//! their store failures do reach the caller as [`ApprovalError`].

use thiserror::Error;

/// Rejected input, reported before any work is done.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("message content not found")]
    MissingMessage,

    #[error("no text to translate after the instruction line")]
    EmptyBatch,
}

/// Failure of a translation backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{0} returned an empty translation")]
    Empty(&'static str),

    #[error("single-line segment came back with {0} lines")]
    MultiLine(usize),

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Rate limits, 5xx and transport failures are worth another attempt.
    /// Other 4xx responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Status { status, .. } => *status == 429 || *status >= 500,
            BackendError::Transport(_) => true,
            _ => false,
        }
    }
}

/// Failure reading or writing catalog rows.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store error: {0}")]
    Other(String),
}

/// Failure recording an approval.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
