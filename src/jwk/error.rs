use thiserror::Error;

pub(crate) type VerificationResult<T> = std::result::Result<T, VerificationError>;

/// Errors that can occur during token verification.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// The token does not consist of exactly three dot-separated segments.
    #[error("malformed token: expected 3 segments, got {0}")]
    InvalidSegmentCount(usize),

    /// A token segment is not valid unpadded base64url.
    #[error("malformed token: could not decode segment: {0}")]
    CannotDecodeJwt(#[from] base64::DecodeError),

    /// The decoded header or payload is not the expected JSON object.
    #[error("malformed token: could not parse {segment}: {source}")]
    InvalidJson {
        /// Which segment failed to parse (`"header"` or `"payload"`).
        segment: &'static str,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// The header names an algorithm outside of RS256, RS384 and RS512.
    #[error("unsupported algorithm {0:?}: only RS256, RS384 and RS512 are allowed")]
    UnsupportedAlgorithm(String),

    /// The token is missing the `kid` header, or it is empty.
    #[error("missing 'kid' header in token")]
    NoKidHeader,

    /// No key with the token's `kid` is present in the key set.
    #[error("no matching public key found for kid {0:?}")]
    NoMatchingKid(String),

    /// The token signature could not be verified.
    #[error("invalid signature")]
    InvalidSignature,

    /// The `nbf` claim is still in the future.
    #[error("token not valid yet (nbf: {nbf}, now: {now})")]
    NotYetValid {
        /// The token's `nbf` claim.
        nbf: i64,
        /// Time of verification.
        now: i64,
    },

    /// The `exp` claim has passed.
    #[error("token expired (exp: {exp}, now: {now})")]
    Expired {
        /// The token's `exp` claim.
        exp: i64,
        /// Time of verification.
        now: i64,
    },

    /// Neither `user_name`/`client_id` nor `user_id`/`sub` is present.
    #[error("token missing required identity claims (user_name/client_id or user_id/sub)")]
    MissingIdentity,
}

impl VerificationError {
    /// Returns `true` when the token could not be taken apart at all.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::InvalidSegmentCount(_) | Self::CannotDecodeJwt(_) | Self::InvalidJson { .. }
        )
    }

    /// Returns `true` for the one failure a key-set refresh can fix.
    pub fn is_unknown_key_id(&self) -> bool {
        matches!(self, Self::NoMatchingKid(_))
    }
}

/// Errors that can occur while fetching or parsing the published key set.
#[derive(Debug, Error)]
pub enum KeySetError {
    /// The configured base URL and key-set path do not form a valid URL.
    #[error("invalid key set URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The default HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(reqwest::Error),

    /// The request failed or timed out, or the body could not be read.
    #[error("failed to fetch key set from the identity provider: {0}")]
    FetchKeySet(reqwest::Error),

    /// The identity provider answered with something other than `200 OK`.
    #[error("key set fetch returned status {0}")]
    UnexpectedStatus(reqwest::StatusCode),

    /// The key-set document is not valid JSON of the expected shape.
    #[error("failed to parse key set document: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    /// An RSA key record carries a modulus or exponent that is not base64url.
    #[error("failed to decode {field} of RSA key {kid:?}: {source}")]
    InvalidKeyMaterial {
        /// Identifier of the offending key record.
        kid: String,
        /// `"modulus"` or `"exponent"`.
        field: &'static str,
        /// The underlying decode error.
        source: base64::DecodeError,
    },

    /// An RSA key whose modulus size the signature backend cannot verify.
    #[error("RSA key {kid:?} has an unsupported {bits}-bit modulus (2048 to 8192 bits required)")]
    UnsupportedKeySize {
        /// Identifier of the offending key record.
        kid: String,
        /// Modulus size in bits.
        bits: usize,
    },
}
