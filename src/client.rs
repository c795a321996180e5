use std::sync::Arc;

use tracing::*;

use crate::cache::{KeyCache, KeySetFetcher};
use crate::jwk::{verify_token, KeySetConfig, PublicKey};
use crate::Claims;

/// `VerifyingClient` verifies bearer tokens against the identity provider's
/// published keys.
///
/// Keys are fetched once at construction and again whenever a token names a
/// key the cache does not hold (for example right after a key rotation).
/// Cloning is cheap; all clones share one key cache.
#[derive(Clone, Debug)]
pub struct VerifyingClient {
    cache: Arc<KeyCache>,
}

impl VerifyingClient {
    /// Creates a client for the identity provider at `base_url` and fetches
    /// its key set.
    ///
    /// Without an `http_client`, one with a 30 second timeout is built.
    /// Fails if the initial fetch fails, since no token could be verified.
    pub async fn new(
        base_url: impl AsRef<str>,
        http_client: Option<reqwest::Client>,
    ) -> crate::Result<Self> {
        let mut config = KeySetConfig::new(base_url)?;
        if let Some(client) = http_client {
            config = config.with_http_client(client);
        }
        Self::with_config(config).await
    }

    /// Creates a client from a full [`KeySetConfig`] and fetches the key set.
    pub async fn with_config(config: KeySetConfig) -> crate::Result<Self> {
        let fetcher = KeySetFetcher::new(&config)?;
        let url = fetcher.url().clone();

        let cache = KeyCache::new(fetcher).await.inspect_err(|err| {
            warn!(%url, error = %err, "Failed to fetch initial key set");
        })?;
        info!(%url, keys = cache.len(), "Key set loaded");

        Ok(Self::from_cache(Arc::new(cache)))
    }

    /// Wraps an existing key cache.
    pub fn from_cache(cache: Arc<KeyCache>) -> Self {
        VerifyingClient { cache }
    }

    /// Verifies a compact token and returns the identity it carries.
    ///
    /// If the token names an unknown key, the key set is refreshed once and
    /// the token verified again; that second result is returned as is. All
    /// other failures are returned immediately.
    pub async fn verify(&self, token: &str) -> crate::Result<Claims> {
        match verify_token(token, &self.cache.snapshot()) {
            Err(err) if err.is_unknown_key_id() => {
                debug!(error = %err, "Unknown key id, refreshing key set");
            }
            result => return Ok(result?),
        }

        let keys = self.cache.refresh().await?;
        Ok(verify_token(token, &keys)?)
    }

    /// Returns the public key for `kid`, refreshing once if it is not cached.
    pub async fn get_key(&self, kid: &str) -> Option<PublicKey> {
        self.cache.get_key(kid).await
    }

    /// The underlying key cache.
    pub fn key_cache(&self) -> &KeyCache {
        &self.cache
    }
}
