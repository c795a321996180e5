use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::*;
use url::Url;

use crate::jwk::{parse_key_set, KeySet, KeySetConfig, KeySetError, PublicKey};
use crate::singleflight::SingleFlight;

/// Outcome of one key-set refresh, handed to every caller that waited on it.
pub type RefreshResult = std::result::Result<Arc<KeySet>, Arc<KeySetError>>;

const REFRESH_KEY: &str = "refresh";

/// Fetches and parses the identity provider's key-set document.
#[derive(Debug, Clone)]
pub struct KeySetFetcher {
    http: reqwest::Client,
    url: Url,
}

impl KeySetFetcher {
    /// Builds a fetcher for the key-set URL described by `config`.
    pub fn new(config: &KeySetConfig) -> Result<Self, KeySetError> {
        Ok(KeySetFetcher {
            http: config.http_client()?,
            url: config.key_set_url()?,
        })
    }

    /// The URL the key set is fetched from.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Issues a single `GET` and parses the response body.
    pub async fn fetch(&self) -> Result<KeySet, KeySetError> {
        let response = self
            .http
            .get(self.url.clone())
            .send()
            .await
            .map_err(KeySetError::FetchKeySet)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(KeySetError::UnexpectedStatus(status));
        }

        let body = response.bytes().await.map_err(KeySetError::FetchKeySet)?;
        let keys = parse_key_set(&body)?;

        debug!(url = %self.url, keys = keys.len(), "Fetched key set");
        Ok(keys)
    }
}

/// Process-wide store of the current [`KeySet`].
///
/// Readers take an `Arc` to the current snapshot without blocking. A refresh
/// builds a complete new snapshot and swaps it in atomically; concurrent
/// refreshes share a single fetch.
pub struct KeyCache {
    current: Arc<ArcSwap<KeySet>>,
    fetcher: KeySetFetcher,
    refreshes: SingleFlight<&'static str, RefreshResult>,
}

impl KeyCache {
    /// Creates the cache and loads the first key set.
    ///
    /// Fails if that first fetch fails: a cache without keys cannot verify anything.
    pub async fn new(fetcher: KeySetFetcher) -> Result<Self, KeySetError> {
        let keys = fetcher.fetch().await?;
        Ok(Self::with_keys(fetcher, keys))
    }

    /// Creates the cache around an already loaded key set.
    pub fn with_keys(fetcher: KeySetFetcher, keys: KeySet) -> Self {
        KeyCache {
            current: Arc::new(ArcSwap::from_pointee(keys)),
            fetcher,
            refreshes: SingleFlight::new(),
        }
    }

    /// The current key set.
    pub fn snapshot(&self) -> Arc<KeySet> {
        self.current.load_full()
    }

    /// Number of keys in the current snapshot.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Returns `true` if the current snapshot holds no keys.
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Swaps in a caller-supplied key set.
    pub fn replace(&self, keys: KeySet) {
        self.current.store(Arc::new(keys));
    }

    /// Returns the key for `kid`, refreshing once if it is not cached.
    ///
    /// `None` after a refresh means the identity provider does not publish
    /// the key. A failed refresh is logged and also yields `None`.
    pub async fn get_key(&self, kid: &str) -> Option<PublicKey> {
        if let Some(key) = self.snapshot().get(kid) {
            return Some(key.clone());
        }

        debug!(kid, "Key not cached, refreshing key set");
        if let Err(err) = self.refresh().await {
            warn!(kid, error = %err, "Failed to refresh key set");
        }

        self.snapshot().get(kid).cloned()
    }

    /// Fetches the key set and swaps it in, or joins a refresh already in flight.
    pub async fn refresh(&self) -> RefreshResult {
        if self.refreshes.is_in_flight(&REFRESH_KEY) {
            debug!("Joining in-flight key set refresh");
        }

        self.refreshes
            .run(REFRESH_KEY, || {
                fetch_and_swap(self.fetcher.clone(), Arc::clone(&self.current))
            })
            .await
    }

    /// The fetcher used for refreshes.
    pub fn fetcher(&self) -> &KeySetFetcher {
        &self.fetcher
    }
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("keys", &self.len())
            .field("url", &self.fetcher.url.as_str())
            .finish_non_exhaustive()
    }
}

async fn fetch_and_swap(fetcher: KeySetFetcher, slot: Arc<ArcSwap<KeySet>>) -> RefreshResult {
    // Readers keep the old snapshot until the parsed set is stored.
    let keys = Arc::new(fetcher.fetch().await?);
    slot.store(Arc::clone(&keys));
    Ok(keys)
}
