//! Error types for token verification.

use thiserror::Error;

/// Errors from bearer token verification and key set loading.
///
/// Every variant except [`TamsCredentialsError::KeySet`] means the caller
/// could not be authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TamsCredentialsError {
    /// No `Authorization: Bearer …` header was present.
    #[error("missing bearer token")]
    MissingToken,

    /// The token is not a well-formed compact JWS.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The token header names an algorithm other than RS256.
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The token was signed with a key that is not in the key set.
    #[error("unknown signing key: {0}")]
    UnknownKey(String),

    /// The signature does not verify against the signing key.
    #[error("invalid token signature")]
    InvalidSignature,

    /// The token's `exp` is in the past.
    #[error("token has expired")]
    Expired,

    /// The token's `nbf` is in the future.
    #[error("token is not yet valid")]
    NotYetValid,

    /// The token's `aud` does not include the configured audience.
    #[error("token audience does not match")]
    InvalidAudience,

    /// The key set could not be fetched or decoded.
    #[error("key set unavailable: {0}")]
    KeySet(String),
}
