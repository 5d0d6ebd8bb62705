use axum::Extension;
use axum::extract::{Path, State};
use axum::response::Response;
use tams_authz::{Caller, Capability, ResourceKind};

use super::{SourcePath, SourceTagPath, filtered_listing, require};
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
    Path(SourcePath { source_id }): Path<SourcePath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    require(&state, &caller, &inbound, ResourceKind::Source, &source_id, Capability::Read).await?;
    passthrough(&state, inbound).await
}

pub async fn write(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(SourcePath { source_id }): Path<SourcePath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    require(&state, &caller, &inbound, ResourceKind::Source, &source_id, Capability::Write).await?;
    passthrough(&state, inbound).await
}

pub async fn read_tag(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(SourceTagPath { source_id, .. }): Path<SourceTagPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    require(&state, &caller, &inbound, ResourceKind::Source, &source_id, Capability::Read).await?;
    passthrough(&state, inbound).await
}

pub async fn put_tag(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(SourceTagPath { source_id, name }): Path<SourceTagPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    super::put_tag(&state, &caller, ResourceKind::Source, &source_id, &name, inbound).await
}

pub async fn delete_tag(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(SourceTagPath { source_id, name }): Path<SourceTagPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    super::delete_tag(&state, &caller, ResourceKind::Source, &source_id, &name, inbound).await
}
