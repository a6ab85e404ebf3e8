//! Attestation tokens: compact JWS `header.claims.signature`.

use std::sync::Arc;

use chrono::Utc;
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::{BigUint, RsaPublicKey};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Sha256, Sha384};
use tracing::{debug, warn};
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

use crate::error::VerifyError;
use crate::transport::HttpTransport;
use crate::utils::crypto::verify_p256_signature_bytes;
use crate::utils::encoding::{b64_decode_any, b64url_decode};

/// Allowed clock skew for `exp` and `nbf`, in seconds.
const CLOCK_SKEW_SECS: i64 = 60;

/// A token split into its three base64url segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    header: String,
    claims: String,
    signature: String,
}

impl Token {
    pub fn split(raw: &str) -> Result<Self, VerifyError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(VerifyError::EmptyToken);
        }
        let segments: Vec<&str> = raw.split('.').collect();
        match segments.as_slice() {
            [header, claims, signature] if !header.is_empty() && !claims.is_empty() => Ok(Self {
                header: header.to_string(),
                claims: claims.to_string(),
                signature: signature.to_string(),
            }),
            _ => Err(VerifyError::MalformedToken(format!(
                "expected 3 non-empty segments, found {}",
                segments.len()
            ))),
        }
    }

    pub fn segments(&self) -> [&str; 3] {
        [&self.header, &self.claims, &self.signature]
    }

    /// The bytes covered by the signature.
    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.claims)
    }

    pub fn header(&self) -> Result<TokenHeader, VerifyError> {
        let bytes = b64url_decode(&self.header)
            .map_err(|e| VerifyError::MalformedToken(format!("header is not base64url: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| VerifyError::MalformedToken(format!("header is not JSON: {e}")))
    }

    pub fn claims(&self) -> Result<Map<String, Value>, VerifyError> {
        let bytes = b64url_decode(&self.claims)
            .map_err(|e| VerifyError::MalformedToken(format!("claims are not base64url: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| VerifyError::MalformedToken(format!("claims are not a JSON object: {e}")))
    }

    pub fn signature(&self) -> Result<Vec<u8>, VerifyError> {
        b64url_decode(&self.signature)
            .map_err(|e| VerifyError::MalformedToken(format!("signature is not base64url: {e}")))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    pub kid: Option<String>,
}

/// Decides whether a token was issued by the attestation service.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &Token) -> Result<(), VerifyError>;
}

/// A JSON Web Key, only the members used for RSA and P-256 keys.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
    pub crv: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
    pub x5c: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Checks token signatures against the provider's published key set.
pub struct JwksVerifier {
    transport: Arc<dyn HttpTransport>,
    jwks_url: String,
}

impl JwksVerifier {
    pub fn new(transport: Arc<dyn HttpTransport>, jwks_url: impl Into<String>) -> Self {
        Self {
            transport,
            jwks_url: jwks_url.into(),
        }
    }

    fn fetch_keys(&self) -> Result<JwkSet, VerifyError> {
        let body = self.transport.get(&self.jwks_url)?;
        serde_json::from_str(&body)
            .map_err(|e| VerifyError::UntrustedToken(format!("malformed key set: {e}")))
    }
}

impl TokenVerifier for JwksVerifier {
    fn verify(&self, token: &Token) -> Result<(), VerifyError> {
        let header = token.header()?;
        let signature = token.signature()?;
        let keys = self.fetch_keys()?;

        let candidates: Vec<&Jwk> = keys
            .keys
            .iter()
            .filter(|key| match (&header.kid, &key.kid) {
                (Some(want), Some(have)) => want == have,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .collect();
        if candidates.is_empty() {
            return Err(VerifyError::UntrustedToken(format!(
                "no signing key {:?} at {}",
                header.kid, self.jwks_url
            )));
        }

        let message = token.signing_input();
        let mut last_error = String::new();
        for key in candidates {
            match verify_with_key(&header.alg, key, message.as_bytes(), &signature) {
                Ok(()) => {
                    debug!(alg = %header.alg, kid = ?key.kid, "token signature verified");
                    return check_lifetime(&token.claims()?, Utc::now().timestamp());
                }
                Err(e) => last_error = e,
            }
        }
        Err(VerifyError::UntrustedToken(last_error))
    }
}

/// Accepts every token. Only for deployments that opt out explicitly.
pub struct UnverifiedTokens;

impl TokenVerifier for UnverifiedTokens {
    fn verify(&self, _token: &Token) -> Result<(), VerifyError> {
        warn!("attestation token signature NOT verified");
        Ok(())
    }
}

fn verify_with_key(alg: &str, key: &Jwk, message: &[u8], signature: &[u8]) -> Result<(), String> {
    match alg {
        "RS256" => {
            let verifier = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(rsa_public_key(key)?);
            let signature = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|e| format!("bad RS256 signature: {e}"))?;
            verifier
                .verify(message, &signature)
                .map_err(|e| format!("RS256 verification failed: {e}"))
        }
        "PS384" => {
            let verifier = rsa::pss::VerifyingKey::<Sha384>::new(rsa_public_key(key)?);
            let signature = rsa::pss::Signature::try_from(signature)
                .map_err(|e| format!("bad PS384 signature: {e}"))?;
            verifier
                .verify(message, &signature)
                .map_err(|e| format!("PS384 verification failed: {e}"))
        }
        "ES256" => {
            let public_key = p256_public_key(key)?;
            verify_p256_signature_bytes(message, signature, &public_key)
                .map_err(|e| format!("ES256 verification failed: {e:#}"))
        }
        other => Err(format!("unsupported token algorithm {other}")),
    }
}

fn rsa_public_key(key: &Jwk) -> Result<RsaPublicKey, String> {
    if key.kty != "RSA" {
        return Err(format!("key {:?} is {}, not RSA", key.kid, key.kty));
    }
    if let (Some(n), Some(e)) = (&key.n, &key.e) {
        let n = b64url_decode(n).map_err(|e| format!("bad modulus: {e}"))?;
        let e = b64url_decode(e).map_err(|e| format!("bad exponent: {e}"))?;
        return RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
            .map_err(|e| format!("invalid RSA key: {e}"));
    }
    let spki = leaf_spki_der(key)?;
    RsaPublicKey::from_public_key_der(&spki).map_err(|e| format!("invalid RSA key: {e}"))
}

/// SEC1 uncompressed point of a P-256 key.
fn p256_public_key(key: &Jwk) -> Result<Vec<u8>, String> {
    if key.kty != "EC" {
        return Err(format!("key {:?} is {}, not EC", key.kid, key.kty));
    }
    if let (Some(x), Some(y)) = (&key.x, &key.y) {
        if key.crv.as_deref().is_some_and(|crv| crv != "P-256") {
            return Err(format!("unsupported curve {:?}", key.crv));
        }
        let x = b64url_decode(x).map_err(|e| format!("bad x coordinate: {e}"))?;
        let y = b64url_decode(y).map_err(|e| format!("bad y coordinate: {e}"))?;
        if x.len() != 32 || y.len() != 32 {
            return Err("P-256 coordinates must be 32 bytes".into());
        }
        let mut point = vec![4u8];
        point.extend_from_slice(&x);
        point.extend_from_slice(&y);
        return Ok(point);
    }
    let spki = leaf_spki_der(key)?;
    let spki = x509_cert::spki::SubjectPublicKeyInfoRef::from_der(&spki)
        .map_err(|e| format!("bad key info: {e}"))?;
    Ok(spki.subject_public_key.raw_bytes().to_vec())
}

/// DER SubjectPublicKeyInfo of the first certificate in `x5c`.
fn leaf_spki_der(key: &Jwk) -> Result<Vec<u8>, String> {
    let leaf = key
        .x5c
        .as_ref()
        .and_then(|chain| chain.first())
        .ok_or_else(|| format!("key {:?} has neither parameters nor x5c", key.kid))?;
    let der = b64_decode_any(leaf).map_err(|e| format!("bad x5c entry: {e}"))?;
    let cert = Certificate::from_der(&der).map_err(|e| format!("bad x5c certificate: {e}"))?;
    cert.tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| format!("encoding key info: {e}"))
}

fn check_lifetime(claims: &Map<String, Value>, now: i64) -> Result<(), VerifyError> {
    if let Some(exp) = claims.get("exp").and_then(Value::as_i64) {
        if now > exp.saturating_add(CLOCK_SKEW_SECS) {
            return Err(VerifyError::UntrustedToken(format!("token expired at {exp}")));
        }
    }
    if let Some(nbf) = claims.get("nbf").and_then(Value::as_i64) {
        if now.saturating_add(CLOCK_SKEW_SECS) < nbf {
            return Err(VerifyError::UntrustedToken(format!("token not valid before {nbf}")));
        }
    }
    Ok(())
}
