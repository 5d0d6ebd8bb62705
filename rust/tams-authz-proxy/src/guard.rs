//! The guard pipeline every routed request passes through before its
//! handler runs.
//!
//! Guards run in the order of [GUARDS]. Each one either lets the request
//! continue to the next guard, hands it straight to the upstream, or fails
//! it. Route handlers then perform the checks specific to their route and
//! find the authenticated [Caller] in the request extensions.

use async_trait::async_trait;
use axum::extract::{FromRequest, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use tams_authz::Caller;
use tams_authz_credentials::bearer_token;

use crate::{AppState, Inbound, TamsProxyError, passthrough};

/// What to do with a request once a guard has passed it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Run the next guard, then the route handler
    Continue,
    /// Forward to the upstream without any further checks
    Forward,
}

#[async_trait]
pub trait Guard: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self, state: &AppState, parts: &mut Parts) -> Result<Verdict, TamsProxyError>;
}

/// Verifies the bearer token and stores the resulting [Caller]
pub struct Authenticate;

#[async_trait]
impl Guard for Authenticate {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    async fn check(&self, state: &AppState, parts: &mut Parts) -> Result<Verdict, TamsProxyError> {
        let authorization = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let claims = state.keys().verify(bearer_token(authorization)?)?;
        let caller = Caller::new(
            state.classifier().clone(),
            claims.groups(state.groups_claim()),
        );

        tracing::debug!(
            subject = claims.subject().unwrap_or_default(),
            groups = %caller.groups().to_csv(),
            "Authenticated caller"
        );

        parts.extensions.insert(caller);
        Ok(Verdict::Continue)
    }
}

/// Lets admins through to the upstream unchecked
pub struct AdminBypass;

#[async_trait]
impl Guard for AdminBypass {
    fn name(&self) -> &'static str {
        "admin-bypass"
    }

    async fn check(&self, _state: &AppState, parts: &mut Parts) -> Result<Verdict, TamsProxyError> {
        match parts.extensions.get::<Caller>() {
            Some(caller) if caller.is_admin() => Ok(Verdict::Forward),
            _ => Ok(Verdict::Continue),
        }
    }
}

/// The guards run for every routed request, in order
pub static GUARDS: &[&dyn Guard] = &[&Authenticate, &AdminBypass];

/// Middleware running [GUARDS] ahead of the matched route
pub async fn dispatch(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, TamsProxyError> {
    let (mut parts, body) = request.into_parts();

    for guard in GUARDS {
        if guard.check(&state, &mut parts).await? == Verdict::Forward {
            tracing::debug!(guard = guard.name(), path = %parts.uri.path(), "Forwarding unchecked");

            let inbound = Inbound::from_request(Request::from_parts(parts, body), &state).await?;
            return passthrough(&state, inbound).await;
        }
    }

    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Middleware forwarding every `OPTIONS` request without authentication
pub async fn preflight(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, TamsProxyError> {
    if request.method() != Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let inbound = Inbound::from_request(request, &state).await?;
    passthrough(&state, inbound).await
}
