//! Top-level error types for permset
//!
//! Every fallible operation in the crate returns [`PermissionError`]. The
//! variants fall into three groups, classified by the helper methods:
//!
//! - malformed input ([`PermissionError::InvalidVerb`], [`PermissionError::InvalidScope`],
//!   [`PermissionError::InvalidRule`]) - fix the request
//! - policy outcomes ([`PermissionError::is_forbidden`]) - deterministic, never retry
//! - store failures ([`PermissionError::Store`]) - passed through from the record store

use thiserror::Error;

use crate::record::StoreError;

/// Errors returned by permission set, scope and record operations.
#[derive(Debug, Error)]
pub enum PermissionError {
    /// A verb name outside GET, POST, PUT, PATCH, DELETE and ALL
    #[error("invalid verb: {0:?}")]
    InvalidVerb(String),

    /// A scope token that does not follow the scope grammar
    #[error("invalid scope token {token:?}: {reason}")]
    InvalidScope {
        /// The offending token
        token: String,
        /// Why it was rejected
        reason: String,
    },

    /// A rule that is not well-formed (empty type, no verbs, ...)
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// A derived set grants something its parent does not
    #[error("attempt to create a larger permission set")]
    NotSubset,

    /// Only application records may be the parent of a derived set
    #[error("only apps can create sharing permissions")]
    OnlyAppCanDerive,

    /// A record already exists where only one is allowed
    #[error("permission record already exists for {0}")]
    AlreadyExists(String),

    /// No matching record
    #[error("no permission record for {0}")]
    NotFound(String),

    /// Stored data violates an invariant (e.g. a share code used twice)
    #[error("inconsistent state: {0}")]
    InconsistentState(String),

    /// The matching record is past its expiry
    #[error("permission record {0} has expired")]
    Expired(String),

    /// Record store failure, passed through unchanged
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl PermissionError {
    /// Returns true for authorization outcomes (HTTP 403 equivalent).
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            Self::NotSubset | Self::OnlyAppCanDerive | Self::Expired(_)
        )
    }

    /// Returns true if the input itself was malformed.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidVerb(_) | Self::InvalidScope { .. } | Self::InvalidRule(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if retrying the same call might succeed.
    ///
    /// Only transient store failures qualify. Policy outcomes and
    /// inconsistent state are deterministic.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// HTTP status code equivalent, for API layers.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidVerb(_) | Self::InvalidScope { .. } | Self::InvalidRule(_) => 400,
            Self::NotSubset | Self::OnlyAppCanDerive | Self::Expired(_) => 403,
            Self::NotFound(_) => 404,
            Self::AlreadyExists(_) => 409,
            Self::Store(StoreError::Conflict(_)) | Self::Store(StoreError::Exists(_)) => 409,
            Self::InconsistentState(_) | Self::Store(_) => 500,
        }
    }

    pub(crate) fn invalid_scope(token: &str, reason: impl Into<String>) -> Self {
        Self::InvalidScope {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for permset operations
pub type Result<T> = std::result::Result<T, PermissionError>;
