//! Read access to the upstream API
//!
//! Every authorization decision starts from data the upstream holds. This
//! module defines the narrow, read-only interface the engine needs, plus a
//! REST implementation and (behind the `helpers` feature) an in-memory one.

use async_trait::async_trait;

use crate::TamsAuthzError;

mod rest;
pub use rest::*;

#[cfg(any(test, feature = "helpers"))]
mod memory;
#[cfg(any(test, feature = "helpers"))]
pub use memory::*;

/// A decoded upstream response
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    /// The HTTP status code
    pub status: u16,
    /// The raw `Link` header, if present
    pub link: Option<String>,
    /// The JSON body; `Null` when the body was empty or not JSON
    pub body: serde_json::Value,
}

impl UpstreamResponse {
    /// Did the upstream answer `200 OK`?
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Read-only access to the upstream API.
///
/// Implementations issue exactly one request per call and never retry. A
/// non-200 status is a successful call; only transport failures (and
/// undecodable `200` bodies) are errors.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// `GET {base_url}{path}` with the given query parameters.
    ///
    /// `path` may itself carry a query string (as produced by following a
    /// pagination link).
    async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<UpstreamResponse, TamsAuthzError>;

    /// The base URL paths are resolved against
    fn base_url(&self) -> &str;

    /// Convert an absolute link returned by the upstream into a path for
    /// [`Upstream::get`]. Links that point anywhere other than the upstream
    /// are refused.
    fn relative_path(&self, link: &str) -> Result<String, TamsAuthzError> {
        let base = self.base_url().trim_end_matches('/');
        if let Some(path) = link.strip_prefix(base) {
            if path.is_empty() || path.starts_with('/') || path.starts_with('?') {
                return Ok(path.to_string());
            }
        }
        if link.starts_with('/') && !link.starts_with("//") {
            return Ok(link.to_string());
        }
        Err(TamsAuthzError::upstream(format!(
            "Refusing to follow link outside the upstream: {link}"
        )))
    }
}
