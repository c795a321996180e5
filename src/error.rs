use std::sync::Arc;

use crate::jwk::{KeySetError, VerificationError};

/// A crate-wide result type alias using the custom [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for bearer token authentication failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Errors that occur while fetching or parsing the published key set.
    ///
    /// A single refresh outcome is shared by every caller that waited on it.
    #[error(transparent)]
    KeySetError(Arc<KeySetError>),

    /// Errors that occur during token verification or claim validation.
    #[error(transparent)]
    VerificationError(#[from] VerificationError),
}

impl Error {
    /// The verification failure, if this is one.
    pub fn verification_error(&self) -> Option<&VerificationError> {
        match self {
            Error::VerificationError(err) => Some(err),
            Error::KeySetError(_) => None,
        }
    }

    /// The key-set failure, if this is one.
    pub fn key_set_error(&self) -> Option<&KeySetError> {
        match self {
            Error::KeySetError(err) => Some(err.as_ref()),
            Error::VerificationError(_) => None,
        }
    }

    /// Returns `true` if the token named a key the identity provider does not publish.
    pub fn is_unknown_key_id(&self) -> bool {
        self.verification_error()
            .is_some_and(VerificationError::is_unknown_key_id)
    }
}

impl From<KeySetError> for Error {
    fn from(err: KeySetError) -> Self {
        Error::KeySetError(Arc::new(err))
    }
}

impl From<Arc<KeySetError>> for Error {
    fn from(err: Arc<KeySetError>) -> Self {
        Error::KeySetError(err)
    }
}
