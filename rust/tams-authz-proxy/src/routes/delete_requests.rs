use axum::Extension;
use axum::extract::{Path, State};
use axum::response::Response;
use serde_json::Value;
use tams_authz::{Access, Caller, Resource, TamsAuthzError, Upstream, check_id};

use super::DeleteRequestPath;
use crate::{AppState, Inbound, TamsProxyError, passthrough};

/// Only admins may list delete requests, and they never get here
pub async fn list() -> Result<Response, TamsProxyError> {
    Err(TamsAuthzError::NotFound.into())
}

/// Read a delete request, given Delete on the flow it is deleting.
///
/// Relies on the upstream still serving the flow while it is being deleted.
pub async fn read(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(DeleteRequestPath { request_id }): Path<DeleteRequestPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    let upstream = state.upstream_for(&inbound.headers);
    let request = upstream
        .get(&format!("/flow-delete-requests/{}", check_id(&request_id)?), &[])
        .await?;

    if !request.is_ok() {
        return Err(TamsAuthzError::NotFound.into());
    }

    let flow_id = request
        .body
        .get("flow_id")
        .and_then(Value::as_str)
        .ok_or_else(|| TamsAuthzError::upstream(format!("Delete request {request_id} has no flow_id")))?;

    Resource::flow(&upstream, flow_id)
        .await?
        .require_delete(&caller)
        .await?;

    passthrough(&state, inbound).await
}
