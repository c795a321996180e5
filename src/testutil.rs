//! Key pairs, signed tokens and key-set documents for unit tests.

use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::Signer;
use serde_json::{json, Value};

use crate::jwk::{parse_key_set, KeySet};

/// The key the mock identity provider publishes.
pub(crate) static PRIMARY_KEY: LazyLock<TestKey> = LazyLock::new(|| TestKey::generate(2048));

/// A second key pair, never published, for forged tokens.
pub(crate) static OTHER_KEY: LazyLock<TestKey> = LazyLock::new(|| TestKey::generate(2048));

/// A 1024-bit key pair, below what the verifier accepts.
pub(crate) static LEGACY_KEY: LazyLock<TestKey> = LazyLock::new(|| TestKey::generate(1024));

pub(crate) struct TestKey {
    pub(crate) encoding_key: EncodingKey,
    private_key: PKey<Private>,
    pub(crate) modulus: Vec<u8>,
    pub(crate) exponent: Vec<u8>,
}

impl TestKey {
    fn generate(bits: u32) -> TestKey {
        let rsa = Rsa::generate(bits).expect("Failed to generate RSA key");
        let private_pem = rsa
            .private_key_to_pem()
            .expect("Failed to export private key");
        let modulus = rsa.n().to_vec();
        let exponent = rsa.e().to_vec();

        TestKey {
            encoding_key: EncodingKey::from_rsa_pem(&private_pem)
                .expect("Failed to create encoding key"),
            private_key: PKey::from_rsa(rsa).expect("Failed to wrap RSA key"),
            modulus,
            exponent,
        }
    }

    /// A `kty: RSA` record publishing this key under `kid`.
    pub(crate) fn key_record(&self, kid: &str) -> Value {
        json!({
            "kty": "RSA",
            "kid": kid,
            "n": BASE64_URL_SAFE_NO_PAD.encode(&self.modulus),
            "e": BASE64_URL_SAFE_NO_PAD.encode(&self.exponent),
            "alg": "RS256",
            "use": "sig"
        })
    }

    pub(crate) fn key_set(&self, kid: &str) -> KeySet {
        let body = jwks_body(vec![self.key_record(kid)]);
        parse_key_set(body.to_string().as_bytes()).expect("Failed to parse test key set")
    }

    pub(crate) fn sign(&self, alg: Algorithm, kid: Option<&str>, claims: &Value) -> String {
        let mut header = Header::new(alg);
        header.kid = kid.map(str::to_owned);
        encode(&header, claims, &self.encoding_key).expect("Failed to sign token")
    }

    /// Signs with openssl instead of `jsonwebtoken`, which works for any key size.
    pub(crate) fn sign_with_openssl(&self, alg: Algorithm, kid: &str, claims: &Value) -> String {
        let header = json!({ "alg": format!("{alg:?}"), "kid": kid, "typ": "JWT" });
        let signing_input = format!(
            "{}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(header.to_string()),
            BASE64_URL_SAFE_NO_PAD.encode(claims.to_string())
        );
        let signature = self.sign_raw(alg, &signing_input);
        format!("{signing_input}.{signature}")
    }

    /// Signs an arbitrary signing input, returning the base64url signature.
    pub(crate) fn sign_raw(&self, alg: Algorithm, signing_input: &str) -> String {
        let digest = match alg {
            Algorithm::RS256 => MessageDigest::sha256(),
            Algorithm::RS384 => MessageDigest::sha384(),
            Algorithm::RS512 => MessageDigest::sha512(),
            other => panic!("No PKCS#1 v1.5 digest for {other:?}"),
        };
        let mut signer = Signer::new(digest, &self.private_key).expect("Failed to create signer");
        signer
            .update(signing_input.as_bytes())
            .expect("Failed to hash signing input");
        let signature = signer.sign_to_vec().expect("Failed to sign input");
        BASE64_URL_SAFE_NO_PAD.encode(signature)
    }
}

/// Builds a token from arbitrary header and claims, with a literal signature segment.
pub(crate) fn unsigned_token(header: &Value, claims: &Value, signature: &str) -> String {
    format!(
        "{}.{}.{}",
        BASE64_URL_SAFE_NO_PAD.encode(header.to_string()),
        BASE64_URL_SAFE_NO_PAD.encode(claims.to_string()),
        signature
    )
}

pub(crate) fn jwks_body(keys: Vec<Value>) -> Value {
    json!({ "keys": keys })
}

pub(crate) fn now() -> i64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    i64::try_from(secs).unwrap()
}
