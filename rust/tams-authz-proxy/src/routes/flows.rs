use axum::Extension;
use axum::extract::{Path, State};
use axum::response::Response;
use serde_json::Value;
use tams_authz::{
    Access, AuthClasses, Caller, Capability, MediaObject, Resource, ResourceKind, TamsAuthzError,
    validate_mutation,
};

use super::{FlowPath, FlowTagPath, filtered_listing, require};
use crate::{AppState, Inbound, TamsProxyError, passthrough};

pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    filtered_listing(&state, &caller, inbound).await
}

pub async fn read(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(FlowPath { flow_id }): Path<FlowPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    require(&state, &caller, &inbound, ResourceKind::Flow, &flow_id, Capability::Read).await?;
    passthrough(&state, inbound).await
}

pub async fn write(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(FlowPath { flow_id }): Path<FlowPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    require(&state, &caller, &inbound, ResourceKind::Flow, &flow_id, Capability::Write).await?;
    passthrough(&state, inbound).await
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(FlowPath { flow_id }): Path<FlowPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    require(&state, &caller, &inbound, ResourceKind::Flow, &flow_id, Capability::Delete).await?;
    passthrough(&state, inbound).await
}

/// Create or replace a flow.
///
/// Replacing needs Write on the flow, and changes to its auth classes pass
/// the mutation guard. Creating needs a `source_id`, and Write on that
/// source when it already exists.
pub async fn put(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(FlowPath { flow_id }): Path<FlowPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    let upstream = state.upstream_for(&inbound.headers);
    let flow = Resource::flow(&upstream, &flow_id).await?;

    if flow.exists() {
        flow.require_write(&caller).await?;

        let proposed = AuthClasses::proposed_in_tags(&inbound.json()?)?;
        validate_mutation(&flow, &proposed, &caller)?;
    } else {
        let body = inbound.json()?;
        let source_id = body
            .get("source_id")
            .and_then(Value::as_str)
            .filter(|source_id| !source_id.is_empty())
            .ok_or_else(|| TamsAuthzError::invalid("Missing source_id"))?;

        let source = Resource::source(&upstream, source_id).await?;
        if source.exists() {
            source.require_write(&caller).await?;
        }
    }

    passthrough(&state, inbound).await
}

pub async fn read_tag(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(FlowTagPath { flow_id, .. }): Path<FlowTagPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    require(&state, &caller, &inbound, ResourceKind::Flow, &flow_id, Capability::Read).await?;
    passthrough(&state, inbound).await
}

pub async fn put_tag(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(FlowTagPath { flow_id, name }): Path<FlowTagPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    super::put_tag(&state, &caller, ResourceKind::Flow, &flow_id, &name, inbound).await
}

pub async fn delete_tag(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(FlowTagPath { flow_id, name }): Path<FlowTagPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    super::delete_tag(&state, &caller, ResourceKind::Flow, &flow_id, &name, inbound).await
}

/// Register segments on a flow.
///
/// The body is one segment or a list of them. Each must name its media
/// object, and objects that already exist must be readable by the caller,
/// so nobody can attach an object they were never given access to.
pub async fn post_segments(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(FlowPath { flow_id }): Path<FlowPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    require(&state, &caller, &inbound, ResourceKind::Flow, &flow_id, Capability::Write).await?;

    let segments = match inbound.json()? {
        Value::Array(segments) => segments,
        segment => vec![segment],
    };

    let upstream = state.upstream_for(&inbound.headers);

    // Sequential: one object lookup at a time
    for segment in &segments {
        let object_id = segment
            .get("object_id")
            .and_then(Value::as_str)
            .filter(|object_id| !object_id.is_empty())
            .ok_or_else(|| TamsAuthzError::invalid("Missing segments `object_id`"))?;

        let object = MediaObject::fetch(&upstream, object_id).await?;
        if !object.exists() {
            continue;
        }

        match object.require_read(&caller).await {
            Ok(()) => {}
            Err(TamsAuthzError::NotFound | TamsAuthzError::Forbidden) => {
                return Err(TamsAuthzError::invalid(format!("Object {object_id} not found")).into());
            }
            Err(error) => return Err(error.into()),
        }
    }

    passthrough(&state, inbound).await
}
