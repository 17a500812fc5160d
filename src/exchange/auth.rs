//! HS256 JWT signing for authenticated BigONE calls.
//!
//! Each token carries `{type: "OpenAPI", sub: <app key>, nonce}`. The
//! exchange rejects a nonce it has already seen, so callers pass a fresh
//! nonce per request.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Serialize)]
struct Claims<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    sub: &'a str,
    nonce: i64,
}

/// Signs bearer tokens with the account's app secret.
pub struct JwtSigner {
    app_key: String,
    app_secret: SecretString,
}

impl JwtSigner {
    pub fn new(app_key: String, app_secret: SecretString) -> Self {
        Self {
            app_key,
            app_secret,
        }
    }

    /// Build a signed token for one request.
    pub fn token(&self, nonce: i64) -> Result<String> {
        let claims = serde_json::to_string(&Claims {
            kind: "OpenAPI",
            sub: &self.app_key,
            nonce,
        })
        .context("Failed to encode JWT claims")?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(HEADER),
            URL_SAFE_NO_PAD.encode(claims)
        );

        let mut mac = HmacSha256::new_from_slice(self.app_secret.expose_secret().as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid HMAC key: {e}"))?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }

    /// `Authorization` header value for one request.
    pub fn bearer(&self, nonce: i64) -> Result<String> {
        Ok(format!("Bearer {}", self.token(nonce)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> JwtSigner {
        JwtSigner::new("my-key".into(), SecretString::new("my-secret".into()))
    }

    fn decode_part(part: &str) -> serde_json::Value {
        let bytes = URL_SAFE_NO_PAD.decode(part).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_token_has_three_parts() {
        let token = signer().token(42).unwrap();
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_claims_contents() {
        let token = signer().token(1_527_665_262_168_391_000).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let header = decode_part(parts[0]);
        assert_eq!(header["alg"], "HS256");

        let claims = decode_part(parts[1]);
        assert_eq!(claims["type"], "OpenAPI");
        assert_eq!(claims["sub"], "my-key");
        assert_eq!(claims["nonce"].as_i64(), Some(1_527_665_262_168_391_000));
    }

    #[test]
    fn test_signature_verifies() {
        let token = signer().token(7).unwrap();
        let (input, sig) = token.rsplit_once('.').unwrap();

        let mut mac = HmacSha256::new_from_slice(b"my-secret").unwrap();
        mac.update(input.as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        assert_eq!(sig, expected);
    }

    #[test]
    fn test_distinct_nonces_give_distinct_tokens() {
        let s = signer();
        assert_ne!(s.token(1).unwrap(), s.token(2).unwrap());
    }

    #[test]
    fn test_bearer_prefix() {
        assert!(signer().bearer(1).unwrap().starts_with("Bearer "));
    }
}
