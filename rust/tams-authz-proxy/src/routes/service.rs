use axum::extract::State;
use axum::response::Response;
use tams_authz::TamsAuthzError;

use crate::{AppState, Inbound, TamsProxyError, passthrough};

/// Open to every authenticated caller
pub async fn open(
    State(state): State<AppState>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    passthrough(&state, inbound).await
}

/// Admins never reach this handler
pub async fn admin_only() -> Result<Response, TamsProxyError> {
    Err(TamsAuthzError::Forbidden.into())
}
