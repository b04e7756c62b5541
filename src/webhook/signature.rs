//! Delivery signature verification.
//!
//! The platform signs each POST body with the app secret and sends the
//! result as `x-hub-signature: <algorithm>=<hex>` (and, on newer API
//! versions, `x-hub-signature-256: sha256=<hex>`). Verification must run
//! over the raw body bytes, before any JSON parsing.

use axum::http::HeaderMap;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Legacy signature header; the algorithm is named in the value
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// SHA-256 signature header, preferred when present
pub const SIGNATURE_256_HEADER: &str = "x-hub-signature-256";

/// Why a delivery failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Missing x-hub-signature header")]
    Missing,

    #[error("Malformed signature header: {0}")]
    Malformed(String),

    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Request signature does not match the payload")]
    Mismatch,
}

/// HMAC digest named in the signature header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl SignatureAlgorithm {
    /// Parse the `<algorithm>` part of the header, ignoring ASCII case.
    pub fn parse(name: &str) -> Result<Self, SignatureError> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("sha1") {
            Ok(SignatureAlgorithm::Sha1)
        } else if name.eq_ignore_ascii_case("sha256") {
            Ok(SignatureAlgorithm::Sha256)
        } else if name.eq_ignore_ascii_case("sha512") {
            Ok(SignatureAlgorithm::Sha512)
        } else {
            Err(SignatureError::UnsupportedAlgorithm(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha1 => "sha1",
            SignatureAlgorithm::Sha256 => "sha256",
            SignatureAlgorithm::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn mac_bytes<M: Mac + KeyInit>(secret: &[u8], body: &[u8]) -> Vec<u8> {
    let mut mac = <M as Mac>::new_from_slice(secret).expect("HMAC can take any key size");
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

fn mac_matches<M: Mac + KeyInit>(secret: &[u8], body: &[u8], expected: &[u8]) -> bool {
    let Ok(mut mac) = <M as Mac>::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(expected).is_ok()
}

/// Compute the header value (`<algorithm>=<hex>`) for a body.
pub fn sign(algorithm: SignatureAlgorithm, secret: &str, body: &[u8]) -> String {
    let digest = match algorithm {
        SignatureAlgorithm::Sha1 => mac_bytes::<Hmac<Sha1>>(secret.as_bytes(), body),
        SignatureAlgorithm::Sha256 => mac_bytes::<Hmac<Sha256>>(secret.as_bytes(), body),
        SignatureAlgorithm::Sha512 => mac_bytes::<Hmac<Sha512>>(secret.as_bytes(), body),
    };
    format!("{}={}", algorithm, hex::encode(digest))
}

/// Verify a signature header value against the raw body.
///
/// Returns the algorithm that was used on success.
pub fn verify(
    signature: &str,
    secret: &str,
    body: &[u8],
) -> Result<SignatureAlgorithm, SignatureError> {
    let (method, hash) = signature
        .trim()
        .split_once('=')
        .ok_or_else(|| SignatureError::Malformed("expected <algorithm>=<hex>".to_string()))?;

    let algorithm = SignatureAlgorithm::parse(method)?;

    if hash.is_empty() {
        return Err(SignatureError::Malformed("empty digest".to_string()));
    }
    let expected = hex::decode(hash)
        .map_err(|e| SignatureError::Malformed(format!("digest is not hex: {}", e)))?;

    let secret = secret.as_bytes();
    let matches = match algorithm {
        SignatureAlgorithm::Sha1 => mac_matches::<Hmac<Sha1>>(secret, body, &expected),
        SignatureAlgorithm::Sha256 => mac_matches::<Hmac<Sha256>>(secret, body, &expected),
        SignatureAlgorithm::Sha512 => mac_matches::<Hmac<Sha512>>(secret, body, &expected),
    };

    if matches {
        Ok(algorithm)
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Verify an inbound request from its headers.
///
/// With `strict` off, a request without any signature header is accepted
/// (`Ok(None)`) and a warning is logged. A header that is present is always
/// checked. `x-hub-signature-256` only accepts a `sha256=` value.
pub fn verify_request(
    headers: &HeaderMap,
    secret: &str,
    body: &[u8],
    strict: bool,
) -> Result<Option<SignatureAlgorithm>, SignatureError> {
    let header = [SIGNATURE_256_HEADER, SIGNATURE_HEADER]
        .into_iter()
        .find_map(|name| headers.get(name).map(|value| (name, value)));

    let Some((name, header)) = header else {
        if strict {
            tracing::warn!("Rejecting delivery without a signature header");
            return Err(SignatureError::Missing);
        }
        tracing::warn!("Couldn't validate the signature: no signature header, accepting anyway");
        return Ok(None);
    };

    let value = header
        .to_str()
        .map_err(|_| SignatureError::Malformed("header is not visible ASCII".to_string()))?;

    if let (SIGNATURE_256_HEADER, Some((method, _))) = (name, value.trim().split_once('=')) {
        if SignatureAlgorithm::parse(method).ok() != Some(SignatureAlgorithm::Sha256) {
            let err = SignatureError::UnsupportedAlgorithm(format!(
                "{} in {}",
                method.trim(),
                SIGNATURE_256_HEADER
            ));
            tracing::warn!(error = %err, "Delivery signature rejected");
            return Err(err);
        }
    }

    match verify(value, secret, body) {
        Ok(algorithm) => {
            tracing::debug!(%algorithm, "Delivery signature verified");
            Ok(Some(algorithm))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Delivery signature rejected");
            Err(e)
        }
    }
}
