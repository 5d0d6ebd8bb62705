use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TamsAuthzError {
    /// The resource does not exist, or the caller has no visibility on it
    #[error("Not found")]
    NotFound,

    /// The caller can see the resource but lacks the required capability
    #[error("Insufficient permissions")]
    Forbidden,

    /// The request is structurally invalid (e.g. a would-be wildcard webhook)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A non-authorization failure while talking to the upstream
    #[error("Upstream request failed: {0}")]
    Upstream(String),
}

impl TamsAuthzError {
    /// Shorthand for [`TamsAuthzError::InvalidRequest`]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    /// Shorthand for [`TamsAuthzError::Upstream`]
    pub fn upstream(reason: impl Into<String>) -> Self {
        Self::Upstream(reason.into())
    }
}
