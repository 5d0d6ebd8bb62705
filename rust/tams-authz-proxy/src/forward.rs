//! Forwarding requests to the upstream and relaying its responses

use axum::body::Body;
use axum::extract::{FromRequest, Request};
use axum::http::header::{
    ACCEPT, ACCEPT_ENCODING, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, LOCATION,
    TRANSFER_ENCODING,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::Value;
use url::form_urlencoded;

use crate::{AppState, TamsProxyError};

/// Content type of bodies rewritten by the proxy
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// An inbound request, buffered so it can be inspected and then forwarded.
///
/// Handlers take this as their last extractor. Bodies larger than the
/// configured limit are refused before anything is forwarded.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FromRequest<AppState> for Inbound {
    type Rejection = TamsProxyError;

    async fn from_request(request: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let limit = state.body_limit();
        let (parts, body) = request.into_parts();

        let body = Limited::new(body, limit)
            .collect()
            .await
            .map_err(|error| {
                if error.is::<LengthLimitError>() {
                    TamsProxyError::PayloadTooLarge(limit)
                } else {
                    TamsProxyError::InvalidBody(error.to_string())
                }
            })?
            .to_bytes();

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body,
        })
    }
}

impl Inbound {
    /// The body as JSON. An empty body is an error, like any other
    /// undecodable one.
    pub fn json(&self) -> Result<Value, TamsProxyError> {
        if self.body.is_empty() {
            return Err(TamsProxyError::InvalidBody("Expected a JSON body".to_string()));
        }

        serde_json::from_slice(&self.body).map_err(|e| TamsProxyError::InvalidBody(e.to_string()))
    }

    /// The first value of query parameter `name`
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;

        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Replace every value of query parameter `name` with `value`
    pub fn with_query_param(mut self, name: &str, value: &str) -> Self {
        let existing = self.query.as_deref().unwrap_or_default();
        let mut serializer = form_urlencoded::Serializer::new(String::new());

        for (key, current) in form_urlencoded::parse(existing.as_bytes()) {
            if key != name {
                serializer.append_pair(&key, &current);
            }
        }
        serializer.append_pair(name, value);

        self.query = Some(serializer.finish());
        self
    }

    /// Replace the body with `body`
    pub fn with_json(mut self, body: &Value) -> Self {
        self.body = Bytes::from(body.to_string());
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        self
    }

    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) if !query.is_empty() => format!("{}?{query}", self.path),
            _ => self.path.clone(),
        }
    }

    /// The origin the client addressed, from `Host` and `X-Forwarded-Proto`
    pub fn origin(&self) -> Option<String> {
        let host = self.headers.get(HOST)?.to_str().ok()?;
        let scheme = self
            .headers
            .get("x-forwarded-proto")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("http");

        Some(format!("{scheme}://{host}"))
    }
}

/// An upstream response on its way back to the client
#[derive(Debug, Clone)]
pub struct Forwarded {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Forwarded {
    /// The body as JSON, if it is JSON
    pub fn json(&self) -> Option<Value> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }

    /// Replace the body with `body`
    pub fn with_json(mut self, body: &Value) -> Self {
        self.body = Bytes::from(body.to_string());
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        self
    }
}

impl IntoResponse for Forwarded {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Forward `inbound` to the upstream.
///
/// The upstream sees the caller's own headers, `Authorization` included,
/// minus those that describe the connection to the proxy. `Accept` is
/// dropped so the upstream never renders HTML with links pointing at itself.
pub async fn send(state: &AppState, inbound: Inbound) -> Result<Forwarded, TamsProxyError> {
    let target = format!("{}{}", state.api_url(), inbound.path_and_query());
    let origin = inbound.origin();

    tracing::info!(method = %inbound.method, path = %inbound.path, %target, "Proxying request");

    let Inbound {
        method,
        mut headers,
        body,
        ..
    } = inbound;

    for name in [
        HOST,
        ACCEPT,
        ACCEPT_ENCODING,
        CONTENT_LENGTH,
        CONNECTION,
        TRANSFER_ENCODING,
    ] {
        headers.remove(name);
    }

    let mut request = state.client().request(method, &target).headers(headers);
    if !body.is_empty() {
        request = request.body(body);
    }

    let response = request
        .send()
        .await
        .map_err(|e| TamsProxyError::Upstream(format!("{target}: {e}")))?;

    let status = response.status();
    let mut headers = response.headers().clone();
    for name in [CONNECTION, TRANSFER_ENCODING, CONTENT_LENGTH] {
        headers.remove(name);
    }

    if matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND) {
        if let Some(origin) = origin {
            rewrite_location(&mut headers, state.api_url(), &origin);
        }
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| TamsProxyError::Upstream(format!("{target}: {e}")))?;

    Ok(Forwarded {
        status,
        headers,
        body,
    })
}

/// Forward `inbound` and relay the response untouched
pub async fn passthrough(state: &AppState, inbound: Inbound) -> Result<Response, TamsProxyError> {
    Ok(send(state, inbound).await?.into_response())
}

fn rewrite_location(headers: &mut HeaderMap, api_url: &str, origin: &str) {
    let Some(location) = headers.get(LOCATION).and_then(|value| value.to_str().ok()) else {
        return;
    };

    let rewritten = location.replace(api_url, origin);
    if let Ok(value) = HeaderValue::from_str(&rewritten) {
        headers.insert(LOCATION, value);
    }
}
