//! Domain error model.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Failures decided by pure domain rules, before anything touches storage.
///
/// Missing records and authorization are not domain concerns here: the
/// engine and the API layer report those themselves.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Bad input from the till or the back office (empty cart, short tender,
    /// negative price).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A record would end up in an impossible state (negative stock, a sale
    /// whose totals do not add up).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The record already moved past the requested transition (voiding a
    /// voided sale, settling a settled payment).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An amount, stock level or counter left the `i64` range.
    #[error("{0} overflow")]
    Overflow(&'static str),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn overflow(what: &'static str) -> Self {
        Self::Overflow(what)
    }
}
