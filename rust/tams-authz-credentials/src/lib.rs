//! Bearer token verification for the TAMS authorization proxy.
//!
//! Tokens are RS256 JWTs issued by an identity provider that publishes its
//! signing keys as a JWKS document. The key set is fetched once with
//! [KeySet::fetch] and then used to [verify](KeySet::verify) every token. The
//! caller's groups are read from a configurable claim with [Claims::groups].
//!
//! With the `helpers` feature, `TokenSigner` issues tokens from a
//! deterministic key for tests.

mod claims;
pub use claims::*;

mod error;
pub use error::*;

mod keys;
pub use keys::*;

#[cfg(any(test, feature = "helpers"))]
mod signer;
#[cfg(any(test, feature = "helpers"))]
pub use signer::*;
