//! RS256 verification against a JWKS key set.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::{BigUint, RsaPublicKey};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use signature::Verifier;

use crate::{Claims, TamsCredentialsError};

/// The only token algorithm accepted
pub const RS256: &str = "RS256";

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    n: Option<String>,
    e: Option<String>,
    #[serde(rename = "use")]
    key_use: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenHeader {
    alg: String,
    kid: Option<String>,
}

/// The RSA public keys tokens may be signed with, by key id.
///
/// A key set is loaded once, when the service starts, and shared read-only
/// from then on.
///
/// # Examples
///
/// ```no_run
/// use tams_authz_credentials::KeySet;
///
/// # async fn example(token: &str) -> Result<(), tams_authz_credentials::TamsCredentialsError> {
/// let keys = KeySet::fetch("https://issuer.example.com/.well-known/jwks.json")
///     .await?
///     .with_audience("tams");
///
/// let claims = keys.verify(token)?;
/// let groups = claims.groups("cognito:groups");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, VerifyingKey<Sha256>>,
    audience: Option<String>,
}

impl KeySet {
    /// An empty key set, which rejects every token
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key under `kid`
    pub fn with_key(mut self, kid: impl Into<String>, key: RsaPublicKey) -> Self {
        self.keys.insert(kid.into(), VerifyingKey::new(key));
        self
    }

    /// Require tokens to name `audience` in their `aud` claim
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Build a key set from a JWKS document.
    ///
    /// Keys that are not RSA signing keys with a `kid` are skipped. A
    /// document with no usable key is an error.
    pub fn from_jwks(jwks: &serde_json::Value) -> Result<Self, TamsCredentialsError> {
        let jwks: Jwks = serde_json::from_value(jwks.clone())
            .map_err(|e| TamsCredentialsError::KeySet(format!("invalid JWKS document: {e}")))?;

        let mut key_set = Self::new();

        for jwk in jwks.keys {
            if jwk.kty != "RSA" || jwk.key_use.as_deref().is_some_and(|key_use| key_use != "sig") {
                continue;
            }

            let (Some(kid), Some(n), Some(e)) = (jwk.kid, jwk.n, jwk.e) else {
                continue;
            };

            match public_key(&n, &e) {
                Ok(key) => key_set = key_set.with_key(kid, key),
                Err(error) => tracing::warn!(%kid, %error, "Skipping unusable JWKS key"),
            }
        }

        if key_set.is_empty() {
            return Err(TamsCredentialsError::KeySet(
                "JWKS document contains no usable RSA signing keys".to_string(),
            ));
        }

        Ok(key_set)
    }

    /// Fetch and decode the JWKS document at `url`
    pub async fn fetch(url: &str) -> Result<Self, TamsCredentialsError> {
        let response = reqwest::get(url)
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| TamsCredentialsError::KeySet(format!("fetching {url} failed: {e}")))?;

        let jwks: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TamsCredentialsError::KeySet(format!("decoding {url} failed: {e}")))?;

        let key_set = Self::from_jwks(&jwks)?;
        tracing::info!(url, keys = key_set.len(), "Loaded signing keys");

        Ok(key_set)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Is the key set empty?
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Is there a key with id `kid`?
    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    /// Verify a compact RS256 token and return its claims.
    ///
    /// `exp` and `nbf` are checked when present, without leeway, and the
    /// audience is checked when one is configured.
    pub fn verify(&self, token: &str) -> Result<Claims, TamsCredentialsError> {
        let mut segments = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TamsCredentialsError::MalformedToken(
                "expected three segments".to_string(),
            ));
        };

        let TokenHeader { alg, kid } = decode_segment(header)?;
        if alg != RS256 {
            return Err(TamsCredentialsError::UnsupportedAlgorithm(alg));
        }

        let kid = kid.ok_or_else(|| TamsCredentialsError::UnknownKey("(none)".to_string()))?;
        let key = self
            .keys
            .get(&kid)
            .ok_or_else(|| TamsCredentialsError::UnknownKey(kid.clone()))?;

        let signature = Signature::try_from(decode(signature)?.as_slice())
            .map_err(|_| TamsCredentialsError::InvalidSignature)?;
        let signing_input = &token[..header.len() + 1 + payload.len()];
        key.verify(signing_input.as_bytes(), &signature)
            .map_err(|_| TamsCredentialsError::InvalidSignature)?;

        let claims: Claims = decode_segment(payload)?;
        let now = chrono::Utc::now().timestamp();

        if claims.expires_at().is_some_and(|exp| exp <= now) {
            return Err(TamsCredentialsError::Expired);
        }

        if claims.not_before().is_some_and(|nbf| nbf > now) {
            return Err(TamsCredentialsError::NotYetValid);
        }

        if let Some(audience) = &self.audience {
            if !claims.has_audience(audience) {
                return Err(TamsCredentialsError::InvalidAudience);
            }
        }

        Ok(claims)
    }
}

fn public_key(n: &str, e: &str) -> Result<RsaPublicKey, TamsCredentialsError> {
    let n = BigUint::from_bytes_be(&decode(n)?);
    let e = BigUint::from_bytes_be(&decode(e)?);

    RsaPublicKey::new(n, e).map_err(|e| TamsCredentialsError::KeySet(e.to_string()))
}

fn decode(segment: &str) -> Result<Vec<u8>, TamsCredentialsError> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| TamsCredentialsError::MalformedToken(e.to_string()))
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, TamsCredentialsError> {
    serde_json::from_slice(&decode(segment)?)
        .map_err(|e| TamsCredentialsError::MalformedToken(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use super::*;
    use crate::TokenSigner;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use testresult::TestResult;

    fn signer() -> &'static TokenSigner {
        static SIGNER: OnceLock<TokenSigner> = OnceLock::new();
        SIGNER.get_or_init(|| TokenSigner::generate("test-key", 42).unwrap())
    }

    fn in_an_hour() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn it_verifies_signed_tokens() -> TestResult {
        let keys = KeySet::from_jwks(&signer().jwks())?;
        let token = signer().sign(&json!({
            "sub": "user",
            "exp": in_an_hour(),
            "cognito:groups": ["news-read"],
        }));

        let claims = keys.verify(&token)?;
        assert_eq!(claims.subject(), Some("user"));
        assert_eq!(claims.groups("cognito:groups"), vec!["news-read".to_string()]);
        Ok(())
    }

    #[test]
    fn it_rejects_tampered_tokens() {
        let keys = signer().key_set();
        let token = signer().sign(&json!({ "cognito:groups": ["news-read"] }));
        let forged = URL_SAFE_NO_PAD.encode(r#"{"cognito:groups":["admin"]}"#);

        let segments: Vec<&str> = token.split('.').collect();
        let tampered = format!("{}.{}.{}", segments[0], forged, segments[2]);

        assert_eq!(
            keys.verify(&tampered),
            Err(TamsCredentialsError::InvalidSignature)
        );
    }

    #[test]
    fn it_rejects_expired_and_premature_tokens() {
        let keys = signer().key_set();
        let now = chrono::Utc::now().timestamp();

        assert_eq!(
            keys.verify(&signer().sign(&json!({ "exp": now - 10 }))),
            Err(TamsCredentialsError::Expired)
        );
        assert_eq!(
            keys.verify(&signer().sign(&json!({ "nbf": now + 600 }))),
            Err(TamsCredentialsError::NotYetValid)
        );
    }

    #[test]
    fn it_rejects_other_algorithms_and_unknown_keys() {
        let keys = signer().key_set();

        let none = signer().sign_with_header(&json!({ "alg": "none", "kid": "test-key" }), &json!({}));
        assert_eq!(
            keys.verify(&none),
            Err(TamsCredentialsError::UnsupportedAlgorithm("none".to_string()))
        );

        let unknown = signer().sign_with_header(&json!({ "alg": "RS256", "kid": "other" }), &json!({}));
        assert_eq!(
            keys.verify(&unknown),
            Err(TamsCredentialsError::UnknownKey("other".to_string()))
        );
    }

    #[test]
    fn it_checks_the_audience_only_when_configured() {
        let token = signer().sign(&json!({ "aud": "elsewhere" }));

        assert!(signer().key_set().verify(&token).is_ok());
        assert_eq!(
            signer().key_set().with_audience("tams").verify(&token),
            Err(TamsCredentialsError::InvalidAudience)
        );
    }

    #[test]
    fn it_rejects_malformed_tokens() {
        let keys = signer().key_set();

        for token in ["", "abc", "a.b", "a.b.c.d", "!!.e30.e30"] {
            assert!(matches!(
                keys.verify(token),
                Err(TamsCredentialsError::MalformedToken(_))
            ));
        }
    }

    #[test]
    fn it_skips_unusable_jwks_entries() -> TestResult {
        let mut jwks = signer().jwks();
        if let Some(keys) = jwks["keys"].as_array_mut() {
            keys.push(json!({ "kty": "EC", "kid": "ec", "crv": "P-256" }));
            keys.push(json!({ "kty": "RSA", "kid": "enc", "use": "enc", "n": "AQAB", "e": "AQAB" }));
            keys.push(json!({ "kty": "RSA", "n": "AQAB", "e": "AQAB" }));
        }

        let keys = KeySet::from_jwks(&jwks)?;
        assert_eq!(keys.len(), 1);
        assert!(keys.contains("test-key"));

        assert!(KeySet::from_jwks(&json!({ "keys": [] })).is_err());
        assert!(KeySet::from_jwks(&json!({ "nope": 1 })).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn it_fetches_key_sets_over_http() -> TestResult {
        let jwks = signer().jwks();
        let app = axum::Router::new().route(
            "/.well-known/jwks.json",
            axum::routing::get(move || async move { axum::Json(jwks) }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let keys = KeySet::fetch(&format!("http://{addr}/.well-known/jwks.json")).await?;
        assert!(keys.contains("test-key"));

        let missing = KeySet::fetch(&format!("http://{addr}/missing")).await;
        assert!(matches!(missing, Err(TamsCredentialsError::KeySet(_))));
        Ok(())
    }
}
