use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tams_authz::TamsAuthzError;
use tams_authz_credentials::TamsCredentialsError;
use thiserror::Error;

/// Errors that end a proxied request before (or instead of) forwarding it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TamsProxyError {
    /// An authorization decision failed
    #[error(transparent)]
    Authz(#[from] TamsAuthzError),

    /// The bearer token was missing or did not verify
    #[error("Unauthorized: {0}")]
    Credentials(#[from] TamsCredentialsError),

    /// The request body could not be interpreted
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// The request body was larger than the configured limit, in bytes
    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// Forwarding to the upstream failed
    #[error("Upstream request failed: {0}")]
    Upstream(String),
}

impl TamsProxyError {
    /// The status code returned to the client
    pub fn status(&self) -> StatusCode {
        match self {
            TamsProxyError::Authz(TamsAuthzError::NotFound) => StatusCode::NOT_FOUND,
            TamsProxyError::Authz(TamsAuthzError::Forbidden) => StatusCode::FORBIDDEN,
            TamsProxyError::Authz(TamsAuthzError::InvalidRequest(_))
            | TamsProxyError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            TamsProxyError::Credentials(_) => StatusCode::UNAUTHORIZED,
            TamsProxyError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            TamsProxyError::Authz(TamsAuthzError::Upstream(_)) | TamsProxyError::Upstream(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// The message returned to the client
    pub fn message(&self) -> String {
        match self {
            TamsProxyError::Authz(TamsAuthzError::NotFound) => "Not found".to_string(),
            TamsProxyError::Authz(TamsAuthzError::Forbidden) => {
                "Insufficient permissions".to_string()
            }
            TamsProxyError::Authz(TamsAuthzError::InvalidRequest(reason))
            | TamsProxyError::InvalidBody(reason) => reason.clone(),
            TamsProxyError::Credentials(_) => "Unauthorized".to_string(),
            TamsProxyError::PayloadTooLarge(_) => self.to_string(),
            TamsProxyError::Authz(TamsAuthzError::Upstream(_)) | TamsProxyError::Upstream(_) => {
                "Upstream request failed".to_string()
            }
        }
    }
}

impl IntoResponse for TamsProxyError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            TamsProxyError::Credentials(error) => {
                tracing::warn!(%error, "Rejected bearer token");
            }
            TamsProxyError::Upstream(_) | TamsProxyError::Authz(TamsAuthzError::Upstream(_)) => {
                tracing::warn!(error = %self, "Upstream failure");
            }
            _ => tracing::debug!(error = %self, %status, "Request refused"),
        }

        let body = json!({
            "description": status.canonical_reason().unwrap_or_default(),
            "status": status.as_u16(),
            "message": self.message(),
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_maps_failures_to_status_codes() {
        let cases = [
            (TamsAuthzError::NotFound.into(), 404),
            (TamsAuthzError::Forbidden.into(), 403),
            (TamsAuthzError::invalid("bad webhook").into(), 400),
            (TamsProxyError::InvalidBody("not json".to_string()), 400),
            (TamsCredentialsError::Expired.into(), 401),
            (TamsProxyError::PayloadTooLarge(1024), 413),
            (TamsAuthzError::upstream("timeout").into(), 502),
            (TamsProxyError::Upstream("refused".to_string()), 502),
        ];

        for (error, status) in cases {
            let error: TamsProxyError = error;
            assert_eq!(error.status().as_u16(), status, "{error}");
        }
    }

    #[test]
    fn it_keeps_invalid_request_reasons_and_hides_the_rest() {
        assert_eq!(
            TamsProxyError::from(TamsAuthzError::invalid("Missing source_id")).message(),
            "Missing source_id"
        );
        assert_eq!(
            TamsProxyError::from(TamsCredentialsError::UnknownKey("k1".to_string())).message(),
            "Unauthorized"
        );
        assert_eq!(
            TamsProxyError::from(TamsAuthzError::upstream("10.0.0.3 refused")).message(),
            "Upstream request failed"
        );
    }
}
