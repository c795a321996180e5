use std::time::{SystemTime, UNIX_EPOCH};

use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::Algorithm;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::*;

use super::error::{VerificationError, VerificationResult};
use super::key::KeySet;
use crate::claims::{Claims, TokenClaims};

/// The only header algorithms a token may name, each an RSA PKCS#1 v1.5
/// signature over the matching SHA-2 digest.
const ALLOWED_ALGORITHMS: &[(&str, Algorithm)] = &[
    ("RS256", Algorithm::RS256),
    ("RS384", Algorithm::RS384),
    ("RS512", Algorithm::RS512),
];

#[derive(Debug, Deserialize)]
struct TokenHeader {
    #[serde(default)]
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

fn allowed_algorithm(name: &str) -> Option<Algorithm> {
    ALLOWED_ALGORITHMS
        .iter()
        .find(|(allowed, _)| *allowed == name)
        .map(|(_, alg)| *alg)
}

/// Verifies a compact token against `keys` at the current time.
pub fn verify_token(token: &str, keys: &KeySet) -> VerificationResult<Claims> {
    verify_token_at(token, keys, unix_now())
}

/// Verifies a compact token against `keys` as of `now` (Unix seconds).
///
/// Checks run in a fixed order: segment count, header, algorithm allowlist,
/// `kid`, key lookup, signature. The payload is decoded only once the
/// signature holds, followed by `nbf`, `exp` and the identity claims.
pub fn verify_token_at(token: &str, keys: &KeySet, now: i64) -> VerificationResult<Claims> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header_b64, payload_b64, signature_b64] = segments[..] else {
        return Err(VerificationError::InvalidSegmentCount(segments.len()));
    };

    let header: TokenHeader = decode_segment(header_b64, "header")?;

    let algorithm = allowed_algorithm(&header.alg)
        .ok_or_else(|| VerificationError::UnsupportedAlgorithm(header.alg.clone()))?;

    let kid = header
        .kid
        .filter(|kid| !kid.is_empty())
        .ok_or(VerificationError::NoKidHeader)?;

    let Some(public_key) = keys.get(&kid) else {
        return Err(VerificationError::NoMatchingKid(kid));
    };

    // Signing input is the original encoded bytes, up to the last dot.
    let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];
    let valid = match jsonwebtoken::crypto::verify(
        signature_b64,
        signing_input.as_bytes(),
        public_key.decoding_key(),
        algorithm,
    ) {
        Ok(valid) => valid,
        Err(err) => {
            debug!(kid = %kid, error = %err, "Signature could not be checked");
            false
        }
    };
    if !valid {
        return Err(VerificationError::InvalidSignature);
    }

    let claims: TokenClaims = decode_segment(payload_b64, "payload")?;

    if let Some(nbf) = claims.nbf {
        if now < nbf {
            return Err(VerificationError::NotYetValid { nbf, now });
        }
    }

    // Valid through the `exp` second itself.
    if let Some(exp) = claims.exp {
        if now > exp {
            return Err(VerificationError::Expired { exp, now });
        }
    }

    let username = claims.username().unwrap_or_default().to_owned();
    let subject = claims.subject().unwrap_or_default().to_owned();
    if username.is_empty() && subject.is_empty() {
        return Err(VerificationError::MissingIdentity);
    }

    Ok(Claims {
        username,
        subject,
        scopes: claims.scope.unwrap_or_default(),
    })
}

fn decode_segment<T: DeserializeOwned>(
    segment: &str,
    name: &'static str,
) -> VerificationResult<T> {
    let bytes = BASE64_URL_SAFE_NO_PAD.decode(segment)?;
    serde_json::from_slice(&bytes).map_err(|source| VerificationError::InvalidJson {
        segment: name,
        source,
    })
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
