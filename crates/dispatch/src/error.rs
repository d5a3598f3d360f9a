use std::fmt;

use crate::event::{SequenceId, SessionKey};

/// Errors surfaced at the ingestion boundary.
#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("update {sequence_id} carries no chat reference")]
    Unroutable { sequence_id: SequenceId },
}

/// A handler invocation that did not complete successfully.
///
/// The event that triggered it has already been removed from its queue
/// and is not redelivered.
#[derive(Debug)]
pub struct HandlerFailure {
    pub session_key: SessionKey,
    pub sequence_id: SequenceId,
    pub kind: FailureKind,
}

#[derive(Debug)]
pub enum FailureKind {
    /// The handler returned an error.
    Error(anyhow::Error),
    /// The handler panicked; the payload message when it was a string.
    Panicked(String),
}

impl HandlerFailure {
    pub fn panicked(&self) -> bool {
        matches!(self.kind, FailureKind::Panicked(_))
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(e) => write!(f, "{e:#}"),
            Self::Panicked(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "handler for session {} failed on event {}: {}",
            self.session_key, self.sequence_id, self.kind
        )
    }
}

impl std::error::Error for HandlerFailure {}
