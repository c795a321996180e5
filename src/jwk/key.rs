use std::collections::HashMap;
use std::fmt;

use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tracing::*;

use super::error::KeySetError;

/// Key type of the only records this crate can use.
const RSA_KEY_TYPE: &str = "RSA";

/// Modulus sizes the signature backend verifies.
const SUPPORTED_MODULUS_BITS: std::ops::RangeInclusive<usize> = 2048..=8192;

/// The key-set document served by the identity provider.
///
/// `keys: null` is valid and means zero keys.
#[derive(Debug, Deserialize)]
pub struct KeySetDocument {
    #[serde(default)]
    pub(crate) keys: Option<Vec<KeyRecord>>,
}

/// One published signing key, as it appears in the key-set document.
///
/// `alg` and `use` are informational; the algorithm is enforced by the verifier.
#[derive(Clone, Debug, Deserialize)]
pub struct KeyRecord {
    #[serde(default)]
    pub(crate) kty: String,
    #[serde(default)]
    pub(crate) kid: String,
    #[serde(default)]
    pub(crate) n: String,
    #[serde(default)]
    pub(crate) e: String,
    #[serde(default)]
    pub(crate) alg: Option<String>,
    #[serde(default, rename = "use")]
    pub(crate) key_use: Option<String>,
}

impl KeyRecord {
    /// Key type (`"RSA"`, `"EC"`, `"oct"`, ...).
    pub fn kty(&self) -> &str {
        &self.kty
    }

    /// Key identifier.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Declared algorithm, if any.
    pub fn alg(&self) -> Option<&str> {
        self.alg.as_deref()
    }

    /// Declared use, if any (usually `"sig"`).
    pub fn key_use(&self) -> Option<&str> {
        self.key_use.as_deref()
    }
}

/// A decoded RSA public key.
///
/// Modulus and exponent are kept as unsigned big-endian bytes with leading
/// zeros stripped, next to the verification key built from them.
#[derive(Clone)]
pub struct PublicKey {
    modulus: Vec<u8>,
    exponent: Vec<u8>,
    decoding_key: DecodingKey,
}

impl PublicKey {
    /// Builds a key from raw big-endian modulus and exponent bytes.
    ///
    /// The exponent may be of any length.
    pub fn from_components(modulus: &[u8], exponent: &[u8]) -> PublicKey {
        let modulus = strip_leading_zeros(modulus);
        let exponent = strip_leading_zeros(exponent);

        PublicKey {
            decoding_key: DecodingKey::from_rsa_raw_components(modulus, exponent),
            modulus: modulus.to_vec(),
            exponent: exponent.to_vec(),
        }
    }

    /// Decodes the base64url modulus and exponent of a key record.
    pub fn from_record(record: &KeyRecord) -> Result<PublicKey, KeySetError> {
        let decode = |field: &'static str, value: &str| {
            BASE64_URL_SAFE_NO_PAD
                .decode(value)
                .map_err(|source| KeySetError::InvalidKeyMaterial {
                    kid: record.kid.clone(),
                    field,
                    source,
                })
        };

        let modulus = decode("modulus", &record.n)?;
        let exponent = decode("exponent", &record.e)?;

        Ok(PublicKey::from_components(&modulus, &exponent))
    }

    /// Modulus as unsigned big-endian bytes.
    pub fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    /// Exponent as unsigned big-endian bytes.
    pub fn exponent(&self) -> &[u8] {
        &self.exponent
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.modulus
            .first()
            .map_or(0, |msb| self.modulus.len() * 8 - msb.leading_zeros() as usize)
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.modulus == other.modulus && self.exponent == other.exponent
    }
}

impl Eq for PublicKey {}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("bits", &self.bits())
            .field("exponent", &self.exponent)
            .finish_non_exhaustive()
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Converts a single key record into a public key.
///
/// Returns `Ok(None)` for records that are not RSA keys, and
/// [`KeySetError::UnsupportedKeySize`] for RSA moduli outside 2048 to 8192 bits.
pub fn decode_key_record(record: &KeyRecord) -> Result<Option<PublicKey>, KeySetError> {
    if record.kty != RSA_KEY_TYPE {
        return Ok(None);
    }

    let key = PublicKey::from_record(record)?;
    if !SUPPORTED_MODULUS_BITS.contains(&key.bits()) {
        return Err(KeySetError::UnsupportedKeySize {
            kid: record.kid.clone(),
            bits: key.bits(),
        });
    }
    Ok(Some(key))
}

/// An immutable snapshot of the published keys, indexed by key identifier.
#[derive(Clone, Debug, Default)]
pub struct KeySet {
    keys: HashMap<String, PublicKey>,
}

impl KeySet {
    /// Looks up a key by its identifier.
    pub fn get(&self, kid: &str) -> Option<&PublicKey> {
        self.keys.get(kid)
    }

    /// Returns `true` if a key with this identifier is present.
    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    /// Number of keys in the set.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterates over the key identifiers, in no particular order.
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

impl FromIterator<(String, PublicKey)> for KeySet {
    fn from_iter<I: IntoIterator<Item = (String, PublicKey)>>(iter: I) -> Self {
        KeySet {
            keys: iter.into_iter().collect(),
        }
    }
}

/// Parses a key-set document into a [`KeySet`].
///
/// Non-RSA records and RSA keys of an unsupported size are skipped. A corrupt
/// RSA record fails the whole parse. When two records share a `kid`, the
/// later one wins.
pub fn parse_key_set(document: &[u8]) -> Result<KeySet, KeySetError> {
    let document: KeySetDocument = serde_json::from_slice(document)?;

    let mut keys = HashMap::new();
    for record in document.keys.unwrap_or_default() {
        match decode_key_record(&record) {
            Ok(Some(public_key)) => {
                keys.insert(record.kid, public_key);
            }
            Ok(None) => {}
            Err(err @ KeySetError::UnsupportedKeySize { .. }) => {
                warn!(kid = %record.kid, error = %err, "Skipping unusable RSA key");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(KeySet { keys })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{jwks_body, LEGACY_KEY, PRIMARY_KEY};
    use serde_json::json;

    // RSA public key from RFC 7517, appendix A.1
    const RFC_MODULUS: &str = "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw";

    fn rsa_record(kid: &str) -> serde_json::Value {
        json!({
            "kty": "RSA",
            "kid": kid,
            "n": RFC_MODULUS,
            "e": "AQAB",
            "alg": "RS256",
            "use": "sig"
        })
    }

    fn parse(value: &serde_json::Value) -> Result<KeySet, KeySetError> {
        parse_key_set(value.to_string().as_bytes())
    }

    #[test]
    fn parses_single_rsa_key() {
        let keys = parse(&jwks_body(vec![rsa_record("test-key-id")])).unwrap();

        assert_eq!(keys.len(), 1);
        let key = keys.get("test-key-id").expect("key should be present");
        assert_eq!(key.exponent(), &[0x01, 0x00, 0x01]);
        assert_eq!(key.bits(), 2048);
    }

    #[test]
    fn parses_multiple_keys() {
        let keys = parse(&jwks_body(vec![rsa_record("key-1"), rsa_record("key-2")])).unwrap();

        assert_eq!(keys.len(), 2);
        assert!(keys.contains("key-1"));
        assert!(keys.contains("key-2"));
    }

    #[test]
    fn skips_non_rsa_keys() {
        let body = jwks_body(vec![
            rsa_record("rsa-key"),
            json!({
                "kty": "EC",
                "kid": "ec-key",
                "crv": "P-256",
                "x": "WbbxfFsQAIHdkp3zT-v-RhXfgG7W5XluomJVxJnJNNw",
                "y": "LGgr4sJEBB2YzJ95kmrCxiQ-1h2e3RWw8hnckP8MhEY",
                "alg": "ES256",
                "use": "sig"
            }),
            json!({
                "kty": "oct",
                "kid": "symmetric-key",
                "k": "GawgguFyGrWKav7AX4VKUg",
                "alg": "HS256"
            }),
        ]);

        let keys = parse(&body).unwrap();

        assert_eq!(keys.len(), 1);
        assert!(keys.contains("rsa-key"));
        assert!(!keys.contains("ec-key"));
        assert!(!keys.contains("symmetric-key"));
    }

    #[test]
    fn null_and_empty_keys_yield_empty_set() {
        for input in [r#"{"keys": null}"#, r#"{"keys": []}"#, "{}"] {
            let keys = parse_key_set(input.as_bytes()).unwrap();
            assert!(keys.is_empty(), "expected no keys for {input}");
        }
    }

    #[test]
    fn rejects_invalid_documents() {
        for input in ["", "not json at all", r#"{"keys": ["#, r#"{"keys": "not an array"}"#, "42"] {
            let result = parse_key_set(input.as_bytes());
            assert!(
                matches!(result, Err(KeySetError::InvalidDocument(_))),
                "expected InvalidDocument for {input:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn corrupt_rsa_material_fails_whole_parse() {
        let mut bad_modulus = rsa_record("bad-n");
        bad_modulus["n"] = json!("!!!not base64!!!");
        let result = parse(&jwks_body(vec![rsa_record("good"), bad_modulus]));
        assert!(matches!(
            result,
            Err(KeySetError::InvalidKeyMaterial { ref kid, field: "modulus", .. }) if kid == "bad-n"
        ));

        let mut bad_exponent = rsa_record("bad-e");
        bad_exponent["e"] = json!("@@@");
        let result = parse(&jwks_body(vec![bad_exponent]));
        assert!(matches!(
            result,
            Err(KeySetError::InvalidKeyMaterial { field: "exponent", .. })
        ));
    }

    #[test]
    fn corrupt_non_rsa_record_is_still_skipped() {
        let body = jwks_body(vec![json!({ "kty": "EC", "kid": "ec", "n": "!!!", "e": "@@@" })]);
        assert!(parse(&body).unwrap().is_empty());
    }

    #[test]
    fn last_duplicate_kid_wins() {
        let mut second = rsa_record("dup");
        second["e"] = json!("Aw"); // 3
        let keys = parse(&jwks_body(vec![rsa_record("dup"), second])).unwrap();

        assert_eq!(keys.len(), 1);
        assert_eq!(keys.get("dup").unwrap().exponent(), &[0x03]);
    }

    #[test]
    fn exponent_of_any_length_is_accepted() {
        // 2^32 + 1, published with a redundant leading zero byte.
        let record: KeyRecord = serde_json::from_value(json!({
            "kty": "RSA",
            "kid": "wide",
            "n": RFC_MODULUS,
            "e": BASE64_URL_SAFE_NO_PAD.encode([0x00, 0x01, 0x00, 0x00, 0x00, 0x01]),
        }))
        .unwrap();

        let key = decode_key_record(&record).unwrap().unwrap();
        assert_eq!(key.exponent(), &[0x01, 0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn decoding_published_components_round_trips() {
        let record: KeyRecord = serde_json::from_value(PRIMARY_KEY.key_record("k")).unwrap();
        let key = PublicKey::from_record(&record).unwrap();

        assert_eq!(key.modulus(), PRIMARY_KEY.modulus.as_slice());
        assert_eq!(key.exponent(), PRIMARY_KEY.exponent.as_slice());
        assert_eq!(
            key,
            PublicKey::from_components(&PRIMARY_KEY.modulus, &PRIMARY_KEY.exponent)
        );
    }

    #[test]
    fn undersized_rsa_key_is_rejected() {
        let record: KeyRecord = serde_json::from_value(LEGACY_KEY.key_record("legacy")).unwrap();

        let result = decode_key_record(&record);

        assert!(matches!(
            result,
            Err(KeySetError::UnsupportedKeySize { ref kid, bits: 1024 }) if kid == "legacy"
        ));
    }

    #[test]
    fn undersized_rsa_key_is_skipped_by_parser() {
        let body = jwks_body(vec![
            LEGACY_KEY.key_record("legacy"),
            PRIMARY_KEY.key_record("current"),
        ]);

        let keys = parse(&body).unwrap();

        assert_eq!(keys.len(), 1);
        assert!(keys.contains("current"));
        assert!(!keys.contains("legacy"));
    }

    #[test]
    fn record_accessors_expose_informational_fields() {
        let record: KeyRecord = serde_json::from_value(rsa_record("info")).unwrap();
        assert_eq!(record.kty(), "RSA");
        assert_eq!(record.kid(), "info");
        assert_eq!(record.alg(), Some("RS256"));
        assert_eq!(record.key_use(), Some("sig"));
    }
}
