//! Deterministic token signing for tests.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::SeedableRng;
use rsa::pkcs1v15::SigningKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{Value, json};
use sha2::Sha256;
use signature::{SignatureEncoding, Signer};

use crate::KeySet;

/// Issues RS256 tokens with a 2048-bit key generated from a fixed seed.
#[derive(Debug, Clone)]
pub struct TokenSigner {
    kid: String,
    signing_key: SigningKey<Sha256>,
    public_key: RsaPublicKey,
}

impl TokenSigner {
    /// Generate a key from `seed`, published under `kid`
    pub fn generate(kid: impl Into<String>, seed: u64) -> Result<Self, rsa::Error> {
        let mut rng = rand_chacha::ChaCha20Rng::seed_from_u64(seed);
        let private_key = RsaPrivateKey::new(&mut rng, 2048)?;
        let public_key = RsaPublicKey::from(&private_key);

        Ok(Self {
            kid: kid.into(),
            signing_key: SigningKey::new(private_key),
            public_key,
        })
    }

    /// The key id tokens are signed under
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The public half as a JWK
    pub fn jwk(&self) -> Value {
        json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": self.kid,
            "n": URL_SAFE_NO_PAD.encode(self.public_key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(self.public_key.e().to_bytes_be()),
        })
    }

    /// A JWKS document holding only this key
    pub fn jwks(&self) -> Value {
        json!({ "keys": [self.jwk()] })
    }

    /// A key set holding only this key
    pub fn key_set(&self) -> KeySet {
        KeySet::new().with_key(self.kid.clone(), self.public_key.clone())
    }

    /// Sign `claims` with a standard RS256 header
    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with_header(&json!({ "alg": "RS256", "typ": "JWT", "kid": self.kid }), claims)
    }

    /// Sign `claims` under an arbitrary header
    pub fn sign_with_header(&self, header: &Value, claims: &Value) -> String {
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        );
        let signature = self.signing_key.sign(signing_input.as_bytes());

        format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature.to_vec()))
    }
}
