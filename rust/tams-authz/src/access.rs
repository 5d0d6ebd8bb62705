use async_trait::async_trait;

use crate::{Caller, Capability, TamsAuthzError};

/// Capability checks shared by everything a caller can be authorized
/// against.
///
/// A *throwing* check turns a denial into an error, hiding existence where
/// the caller has no visibility at all:
///
/// | Situation | Error |
/// |-----------|-------|
/// | resource absent | [`TamsAuthzError::NotFound`] |
/// | caller holds no capability on it | [`TamsAuthzError::NotFound`] |
/// | caller holds some capability, not this one | [`TamsAuthzError::Forbidden`] |
///
/// A non-throwing check only reports whether the capability is granted, and
/// the caller must branch on it.
#[async_trait]
pub trait Access: Send + Sync {
    /// Is `capability` granted to `caller`?
    async fn authorize(
        &self,
        caller: &Caller,
        capability: Capability,
        throwing: bool,
    ) -> Result<bool, TamsAuthzError>;

    /// Does `caller` hold any capability at all? A throwing denial is always
    /// [`TamsAuthzError::NotFound`].
    async fn authorize_any(&self, caller: &Caller, throwing: bool) -> Result<bool, TamsAuthzError>;

    /// Non-throwing check
    async fn permits(&self, caller: &Caller, capability: Capability) -> Result<bool, TamsAuthzError> {
        self.authorize(caller, capability, false).await
    }

    /// Throwing check
    async fn require(&self, caller: &Caller, capability: Capability) -> Result<(), TamsAuthzError> {
        match self.authorize(caller, capability, true).await? {
            true => Ok(()),
            false => Err(TamsAuthzError::Forbidden),
        }
    }

    /// Throwing [`Capability::Read`] check
    async fn require_read(&self, caller: &Caller) -> Result<(), TamsAuthzError> {
        self.require(caller, Capability::Read).await
    }

    /// Throwing [`Capability::Write`] check
    async fn require_write(&self, caller: &Caller) -> Result<(), TamsAuthzError> {
        self.require(caller, Capability::Write).await
    }

    /// Throwing [`Capability::Delete`] check
    async fn require_delete(&self, caller: &Caller) -> Result<(), TamsAuthzError> {
        self.require(caller, Capability::Delete).await
    }
}
