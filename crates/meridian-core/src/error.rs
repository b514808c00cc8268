// SPDX-License-Identifier: Apache-2.0
//! Shared error taxonomy for the control plane.
//!
//! Every fallible operation in the workspace returns [`PlaneResult`]. A
//! surfaced [`PlaneError`] always carries four things: a category
//! ([`ErrorKind`]), a stable machine-readable code (rendered in brackets by
//! `Display`), a human-readable message, and the name of the originating
//! operation. Retry loops dispatch on the category alone; codes are for
//! logs, metrics, and operator tooling and must never change meaning.

use thiserror::Error;

/// Stable machine-readable error codes.
///
/// Codes follow a `AREA_REASON` convention. Adding a code is fine; renaming
/// or reusing one is a breaking change for every consumer that alerts on it.
pub mod codes {
    /// An identifier failed shape validation.
    pub const ID_INVALID: &str = "ID_INVALID";
    /// An entity field violated its documented bounds.
    pub const FIELD_INVALID: &str = "FIELD_INVALID";
    /// A referenced entity does not exist.
    pub const ENTITY_NOT_FOUND: &str = "ENTITY_NOT_FOUND";
    /// Optimistic-concurrency version mismatch on an entity write.
    pub const VERSION_CONFLICT: &str = "VERSION_CONFLICT";
    /// A lifecycle rule forbade the transition.
    pub const LIFECYCLE_CONFLICT: &str = "LIFECYCLE_CONFLICT";
    /// A second PENDING approval request exists for the same requester and service.
    pub const APPROVAL_DUPLICATE_PENDING: &str = "APPROVAL_DUPLICATE_PENDING";
    /// An actor voted twice on the same approval gate.
    pub const APPROVAL_DOUBLE_VOTE: &str = "APPROVAL_DOUBLE_VOTE";
    /// A decision referenced a gate the request does not require.
    pub const APPROVAL_UNKNOWN_GATE: &str = "APPROVAL_UNKNOWN_GATE";
    /// The authorization evaluator denied the action.
    pub const ACCESS_DENIED: &str = "ACCESS_DENIED";
    /// A KV write lost its compare-and-set race.
    pub const KV_CAS_CONFLICT: &str = "KV_CAS_CONFLICT";
    /// A KV path failed normalization or validation.
    pub const KV_PATH_INVALID: &str = "KV_PATH_INVALID";
    /// A KV transaction check op failed; the transaction rolled back.
    pub const KV_TXN_FAILED: &str = "KV_TXN_FAILED";
    /// A distributed lock was held by another session.
    pub const KV_LOCK_HELD: &str = "KV_LOCK_HELD";
    /// The storage or KV backend could not be reached.
    pub const BACKEND_UNAVAILABLE: &str = "BACKEND_UNAVAILABLE";
    /// The request deadline elapsed before the operation completed.
    pub const DEADLINE_EXCEEDED: &str = "DEADLINE_EXCEEDED";
    /// A bounded queue refused the submission.
    pub const QUEUE_FULL: &str = "QUEUE_FULL";
    /// An inbound wire message violated its documented shape.
    pub const WIRE_INVALID: &str = "WIRE_INVALID";
}

/// Category of a [`PlaneError`]. Retry policy dispatches on this alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input violated its documented shape or bounds. Fatal for the call.
    InvalidArgument,
    /// A referenced entity does not exist.
    NotFound,
    /// CAS/version mismatch, duplicate-pending violation, or lifecycle rule
    /// violation. Retryable only inside internal optimistic-concurrency loops.
    Conflict,
    /// The authorization evaluator returned DENY. Never retried.
    Forbidden,
    /// A backend dependency is unreachable. Retried with backoff, bounded by
    /// the caller's deadline; reads may degrade to the fallback cache.
    BackendUnavailable,
    /// The deadline elapsed before the operation completed. No retry.
    DeadlineExceeded,
    /// A bounded queue rejected the submission. The producer decides.
    Overloaded,
}

impl ErrorKind {
    /// Whether internal retry loops may retry an error of this category.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::BackendUnavailable)
    }
}

/// The surfaced error of every control-plane operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {op}: {message}")]
pub struct PlaneError {
    kind: ErrorKind,
    code: &'static str,
    op: &'static str,
    message: String,
}

impl PlaneError {
    /// Construct an error from all four parts.
    pub fn new(kind: ErrorKind, code: &'static str, op: &'static str, message: impl Into<String>) -> Self {
        Self { kind, code, op, message: message.into() }
    }

    /// Shorthand for an [`ErrorKind::InvalidArgument`] error.
    pub fn invalid_argument(code: &'static str, op: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, code, op, message)
    }

    /// Shorthand for an [`ErrorKind::NotFound`] error.
    pub fn not_found(code: &'static str, op: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, code, op, message)
    }

    /// Shorthand for an [`ErrorKind::Conflict`] error.
    pub fn conflict(code: &'static str, op: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, code, op, message)
    }

    /// Shorthand for an [`ErrorKind::Forbidden`] error.
    pub fn forbidden(code: &'static str, op: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, code, op, message)
    }

    /// Shorthand for an [`ErrorKind::BackendUnavailable`] error.
    pub fn backend_unavailable(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendUnavailable, codes::BACKEND_UNAVAILABLE, op, message)
    }

    /// Shorthand for an [`ErrorKind::DeadlineExceeded`] error.
    pub fn deadline_exceeded(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeadlineExceeded, codes::DEADLINE_EXCEEDED, op, message)
    }

    /// Shorthand for an [`ErrorKind::Overloaded`] error.
    pub fn overloaded(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Overloaded, codes::QUEUE_FULL, op, message)
    }

    /// The error category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// The originating operation name.
    #[must_use]
    pub fn op(&self) -> &'static str {
        self.op
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result alias used across the workspace.
pub type PlaneResult<T> = Result<T, PlaneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_code_op_and_message() {
        let err = PlaneError::conflict(codes::VERSION_CONFLICT, "approval.submit", "version moved");
        assert_eq!(err.to_string(), "[VERSION_CONFLICT] approval.submit: version moved");
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn only_backend_unavailable_is_retryable() {
        assert!(ErrorKind::BackendUnavailable.is_retryable());
        for kind in [
            ErrorKind::InvalidArgument,
            ErrorKind::NotFound,
            ErrorKind::Conflict,
            ErrorKind::Forbidden,
            ErrorKind::DeadlineExceeded,
            ErrorKind::Overloaded,
        ] {
            assert!(!kind.is_retryable(), "{kind:?} must not be retryable");
        }
    }
}
