//! The proxied TAMS routes and the checks made on each of them before
//! forwarding.

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tams_authz::{
    Access, AuthClasses, Caller, Capability, ListingScope, Resource, ResourceKind,
    TAG_AUTH_CLASSES, TamsAuthzError, validate_mutation,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::{AppState, Inbound, TamsProxyError, dispatch, passthrough, preflight, send};

pub mod delete_requests;
pub mod flows;
pub mod objects;
pub mod service;
pub mod sources;
pub mod webhooks;

/// The tag whose changes go through the mutation guard
const AUTH_CLASSES_TAG: &str = "auth_classes";

#[derive(Debug, Deserialize)]
pub struct SourcePath {
    pub source_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FlowPath {
    pub flow_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SourceTagPath {
    pub source_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct FlowTagPath {
    pub flow_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPath {
    pub webhook_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ObjectPath {
    pub object_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequestPath {
    pub request_id: String,
}

/// Build the proxy.
///
/// Requests to known routes pass the guard pipeline and then their route's
/// checks. `OPTIONS` requests are forwarded before either, and anything else
/// is answered with a 404.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service::open))
        .route("/service", get(service::open).post(service::admin_only))
        .route("/service/storage-backends", get(service::open))
        .route(
            "/service/webhooks",
            get(webhooks::list).post(webhooks::create),
        )
        .route(
            "/service/webhooks/{webhook_id}",
            get(webhooks::read)
                .put(webhooks::update)
                .delete(webhooks::remove),
        )
        .route("/sources", get(sources::list))
        .route("/sources/{source_id}", get(sources::read))
        .route("/sources/{source_id}/tags", get(sources::read))
        .route(
            "/sources/{source_id}/tags/{name}",
            get(sources::read_tag)
                .put(sources::put_tag)
                .delete(sources::delete_tag),
        )
        .route(
            "/sources/{source_id}/description",
            get(sources::read).put(sources::write).delete(sources::write),
        )
        .route(
            "/sources/{source_id}/label",
            get(sources::read).put(sources::write).delete(sources::write),
        )
        .route("/flows", get(flows::list))
        .route(
            "/flows/{flow_id}",
            get(flows::read).put(flows::put).delete(flows::remove),
        )
        .route("/flows/{flow_id}/tags", get(flows::read))
        .route(
            "/flows/{flow_id}/tags/{name}",
            get(flows::read_tag)
                .put(flows::put_tag)
                .delete(flows::delete_tag),
        )
        .route(
            "/flows/{flow_id}/description",
            get(flows::read).put(flows::write).delete(flows::write),
        )
        .route(
            "/flows/{flow_id}/label",
            get(flows::read).put(flows::write).delete(flows::write),
        )
        .route(
            "/flows/{flow_id}/read_only",
            get(flows::read).put(flows::write),
        )
        .route(
            "/flows/{flow_id}/flow_collection",
            get(flows::read).put(flows::write).delete(flows::write),
        )
        .route(
            "/flows/{flow_id}/max_bit_rate",
            get(flows::read).put(flows::write).delete(flows::write),
        )
        .route(
            "/flows/{flow_id}/avg_bit_rate",
            get(flows::read).put(flows::write).delete(flows::write),
        )
        .route(
            "/flows/{flow_id}/segments",
            get(flows::read)
                .post(flows::post_segments)
                .delete(flows::remove),
        )
        .route("/flows/{flow_id}/storage", post(flows::write))
        .route("/objects/{object_id}", get(objects::read))
        .route(
            "/objects/{object_id}/instances",
            post(objects::write).delete(objects::write),
        )
        .route("/flow-delete-requests", get(delete_requests::list))
        .route("/flow-delete-requests/{request_id}", get(delete_requests::read))
        .route_layer(from_fn_with_state(state.clone(), dispatch))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(from_fn_with_state(state.clone(), preflight))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> Response {
    TamsProxyError::from(TamsAuthzError::NotFound).into_response()
}

/// Look up a resource and require `capability` on it
async fn require(
    state: &AppState,
    caller: &Caller,
    inbound: &Inbound,
    kind: ResourceKind,
    id: &str,
    capability: Capability,
) -> Result<Resource, TamsProxyError> {
    let resource = Resource::fetch(&state.upstream_for(&inbound.headers), kind, id).await?;
    resource.require(caller, capability).await?;
    Ok(resource)
}

/// Forward a listing with its class filter narrowed to the caller's
/// readable classes, then drop anything the caller may not see.
async fn filtered_listing(
    state: &AppState,
    caller: &Caller,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    let scope = ListingScope::new(caller, inbound.query_param(TAG_AUTH_CLASSES).as_deref());
    let inbound = inbound.with_query_param(TAG_AUTH_CLASSES, &scope.query_value());

    let forwarded = send(state, inbound).await?;
    if !forwarded.status.is_success() {
        return Ok(forwarded.into_response());
    }

    match forwarded.json() {
        Some(body) => {
            let filtered = scope.filter_listing(body);
            Ok(forwarded.with_json(&filtered).into_response())
        }
        None => Ok(forwarded.into_response()),
    }
}

/// `PUT …/tags/{name}`: the body is the new tag value
async fn put_tag(
    state: &AppState,
    caller: &Caller,
    kind: ResourceKind,
    id: &str,
    name: &str,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    let resource = require(state, caller, &inbound, kind, id, Capability::Write).await?;

    if name == AUTH_CLASSES_TAG {
        let proposed = AuthClasses::proposed(&inbound.json()?)?;
        validate_mutation(&resource, &proposed, caller)?;
    }

    passthrough(state, inbound).await
}

/// `DELETE …/tags/{name}`: deleting the auth classes removes all of them
async fn delete_tag(
    state: &AppState,
    caller: &Caller,
    kind: ResourceKind,
    id: &str,
    name: &str,
    inbound: Inbound,
) -> Result<Response, TamsProxyError> {
    let resource = require(state, caller, &inbound, kind, id, Capability::Write).await?;

    if name == AUTH_CLASSES_TAG {
        validate_mutation(&resource, &AuthClasses::new(), caller)?;
    }

    passthrough(state, inbound).await
}
