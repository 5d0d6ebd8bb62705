use axum::Extension;
use axum::extract::{Path, State};
use axum::response::Response;
use tams_authz::{
    AuthClasses, Caller, Capability, ResourceKind, WebhookSubscription, resolve_webhook,
    validate_mutation,
};

use super::{WebhookPath, filtered_listing, require};
use crate::{AppState, Inbound, TamsProxyError, passthrough};

pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    filtered_listing(&state, &caller, inbound).await
}

/// Create a webhook, resolved into a static subscription first
pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    let inbound = resolved(&state, &caller, inbound).await?;
    passthrough(&state, inbound).await
}

pub async fn read(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(WebhookPath { webhook_id }): Path<WebhookPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    require(&state, &caller, &inbound, ResourceKind::Webhook, &webhook_id, Capability::Read).await?;
    passthrough(&state, inbound).await
}

/// Replace a webhook. Its auth classes pass the mutation guard, and the new
/// subscription is resolved like a new one.
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(WebhookPath { webhook_id }): Path<WebhookPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    let webhook = require(
        &state,
        &caller,
        &inbound,
        ResourceKind::Webhook,
        &webhook_id,
        Capability::Write,
    )
    .await?;

    let proposed = AuthClasses::proposed_in_tags(&inbound.json()?)?;
    validate_mutation(&webhook, &proposed, &caller)?;

    let inbound = resolved(&state, &caller, inbound).await?;
    passthrough(&state, inbound).await
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(WebhookPath { webhook_id }): Path<WebhookPath>,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    require(&state, &caller, &inbound, ResourceKind::Webhook, &webhook_id, Capability::Delete)
        .await?;
    passthrough(&state, inbound).await
}

async fn resolved(
    state: &AppState,
    caller: &Caller,
    inbound: Inbound,
) -> Result<Inbound, TamsProxyError> {
    let subscription = WebhookSubscription::from_json(inbound.json()?)?;
    let upstream = state.upstream_for(&inbound.headers);
    let resolved = resolve_webhook(&upstream, caller, subscription).await?;

    tracing::debug!(
        flows = resolved.flow_ids.as_ref().map_or(0, Vec::len),
        sources = resolved.source_ids.as_ref().map_or(0, Vec::len),
        "Resolved webhook subscription"
    );

    Ok(inbound.with_json(&resolved.to_json()?))
}
