use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::TamsCredentialsError;

/// Claim listing the caller's groups unless configured otherwise
pub const DEFAULT_GROUPS_CLAIM: &str = "cognito:groups";

/// The verified payload of a bearer token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Wrap a decoded payload
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// A single claim
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The token subject, if any
    pub fn subject(&self) -> Option<&str> {
        self.get("sub").and_then(Value::as_str)
    }

    /// Expiry, in seconds since the epoch
    pub fn expires_at(&self) -> Option<i64> {
        self.get("exp").and_then(timestamp)
    }

    /// Start of validity, in seconds since the epoch
    pub fn not_before(&self) -> Option<i64> {
        self.get("nbf").and_then(timestamp)
    }

    /// Does the `aud` claim (a string or a list of strings) name `audience`?
    pub fn has_audience(&self, audience: &str) -> bool {
        match self.get("aud") {
            Some(Value::String(aud)) => aud == audience,
            Some(Value::Array(auds)) => auds.iter().any(|aud| aud.as_str() == Some(audience)),
            _ => false,
        }
    }

    /// The groups listed under `claim`.
    ///
    /// A missing claim, or one that is not a list, yields no groups. Entries
    /// that are not strings are skipped.
    pub fn groups(&self, claim: &str) -> Vec<String> {
        self.get(claim)
            .and_then(Value::as_array)
            .map(|groups| {
                groups
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn timestamp(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|seconds| seconds as i64))
}

/// Extract the token from an `Authorization` header value
pub fn bearer_token(authorization: Option<&str>) -> Result<&str, TamsCredentialsError> {
    let value = authorization.ok_or(TamsCredentialsError::MissingToken)?;
    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(TamsCredentialsError::MissingToken)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(TamsCredentialsError::MissingToken);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(TamsCredentialsError::MissingToken);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn claims(value: Value) -> Claims {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn it_reads_groups_from_the_configured_claim() {
        let claims = claims(json!({
            "sub": "user",
            "cognito:groups": ["news-read", 42, "news-write"],
            "roles": "admin",
        }));

        assert_eq!(
            claims.groups(DEFAULT_GROUPS_CLAIM),
            vec!["news-read".to_string(), "news-write".to_string()]
        );
        assert!(claims.groups("roles").is_empty());
        assert!(claims.groups("missing").is_empty());
        assert_eq!(claims.subject(), Some("user"));
    }

    #[test]
    fn it_matches_string_and_list_audiences() {
        assert!(claims(json!({ "aud": "tams" })).has_audience("tams"));
        assert!(claims(json!({ "aud": ["other", "tams"] })).has_audience("tams"));
        assert!(!claims(json!({ "aud": "other" })).has_audience("tams"));
        assert!(!claims(json!({})).has_audience("tams"));
    }

    #[test]
    fn it_extracts_bearer_tokens() {
        assert_eq!(bearer_token(Some("Bearer abc.def.ghi")), Ok("abc.def.ghi"));
        assert_eq!(bearer_token(Some("bearer  abc")), Ok("abc"));
        assert_eq!(bearer_token(None), Err(TamsCredentialsError::MissingToken));
        assert_eq!(
            bearer_token(Some("Basic dXNlcjpwYXNz")),
            Err(TamsCredentialsError::MissingToken)
        );
        assert_eq!(bearer_token(Some("Bearer")), Err(TamsCredentialsError::MissingToken));
    }
}
