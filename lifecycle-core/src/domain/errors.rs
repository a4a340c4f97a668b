//! Engine error types

use thiserror::Error;

/// Errors raised by the lifecycle and aggregation core.
///
/// Every failure path in the core returns one of these; nothing panics.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid transition: event {event} is not applicable from status {from}")]
    InvalidTransition { from: String, event: String },

    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Broad classification for callers deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input at a boundary; reject and report, never retry.
    Validation,
    /// Event inapplicable to current state; surface as a rejection.
    Transition,
    /// Internal consistency failure; drop the offending operation, log loudly.
    Consistency,
    /// Missing lookup target; caller decides create-on-demand vs fail.
    Lookup,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::Validation,
            Self::InvalidTransition { .. } => ErrorKind::Transition,
            Self::InvariantViolated(_) => ErrorKind::Consistency,
            Self::NotFound(_) => ErrorKind::Lookup,
        }
    }

    /// Consistency failures must never be swallowed silently.
    pub fn is_consistency(&self) -> bool {
        matches!(self.kind(), ErrorKind::Consistency)
    }
}
