use axum::Extension;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use tams_authz::{
    Access, Caller, FLOW_TAG_AUTH_CLASSES, ListingScope, MediaObject, filter_object_references,
};

use super::ObjectPath;
use crate::{AppState, Inbound, TamsProxyError, passthrough, send};

/// Read an object, showing only the referencing flows the caller may see.
///
/// The caller's own `flow_tag.auth_classes` filter, if any, narrows the
/// references further. An object whose references are all filtered out is
/// still returned.
pub async fn read(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(ObjectPath { object_id }): Path<ObjectPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    let upstream = state.upstream_for(&inbound.headers);
    MediaObject::fetch(&upstream, &object_id)
        .await?
        .require_read(&caller)
        .await?;

    let scope = ListingScope::new(&caller, inbound.query_param(FLOW_TAG_AUTH_CLASSES).as_deref());
    let inbound = inbound.with_query_param(FLOW_TAG_AUTH_CLASSES, &scope.query_value());

    let forwarded = send(&state, inbound).await?;
    if !forwarded.status.is_success() {
        return Ok(forwarded.into_response());
    }

    match forwarded.json() {
        Some(body) => {
            let filtered = filter_object_references(&upstream, &scope, body).await?;
            Ok(forwarded.with_json(&filtered).into_response())
        }
        None => Ok(forwarded.into_response()),
    }
}

pub async fn write(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(ObjectPath { object_id }): Path<ObjectPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    let upstream = state.upstream_for(&inbound.headers);
    MediaObject::fetch(&upstream, &object_id)
        .await?
        .require_write(&caller)
        .await?;

    passthrough(&state, inbound).await
}
