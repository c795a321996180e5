use std::time::Duration;

use url::Url;

use super::error::KeySetError;

/// Where to fetch the key set from, and how.
#[derive(Debug, Clone)]
pub struct KeySetConfig {
    base_url: Url,
    key_set_path: String,
    timeout: Duration,
    accept_invalid_certs: bool,
    http_client: Option<reqwest::Client>,
}

impl KeySetConfig {
    /// Path of the key-set endpoint on a UAA server.
    pub const DEFAULT_KEY_SET_PATH: &str = "/token_keys";

    /// Upper bound on a single key-set fetch.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    const ENV_BASE_URL: &str = "JWKS_BASE_URL";
    const ENV_KEY_SET_PATH: &str = "JWKS_KEY_SET_PATH";
    const ENV_TIMEOUT_SECS: &str = "JWKS_TIMEOUT_SECS";
    const ENV_SKIP_SSL_VALIDATION: &str = "JWKS_SKIP_SSL_VALIDATION";

    /// Creates a config for the identity provider at `base_url`.
    pub fn new(base_url: impl AsRef<str>) -> Result<KeySetConfig, KeySetError> {
        Ok(KeySetConfig {
            base_url: Url::parse(base_url.as_ref())?,
            key_set_path: Self::DEFAULT_KEY_SET_PATH.to_owned(),
            timeout: Self::DEFAULT_TIMEOUT,
            accept_invalid_certs: false,
            http_client: None,
        })
    }

    /// Reads the config from `JWKS_*` environment variables.
    pub fn from_env() -> Result<KeySetConfig, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the config through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<KeySetConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(Self::ENV_BASE_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(Self::ENV_BASE_URL))?;

        let mut config = KeySetConfig::new(base_url.trim())
            .map_err(|_| ConfigError::Invalid(Self::ENV_BASE_URL))?;

        if let Some(path) = lookup(Self::ENV_KEY_SET_PATH).filter(|v| !v.is_empty()) {
            config = config.with_key_set_path(path);
        }

        if let Some(secs) = lookup(Self::ENV_TIMEOUT_SECS) {
            let secs = secs
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid(Self::ENV_TIMEOUT_SECS))?;
            config = config.with_timeout(Duration::from_secs(secs));
        }

        if let Some(flag) = lookup(Self::ENV_SKIP_SSL_VALIDATION) {
            let skip = parse_bool(&flag).ok_or(ConfigError::Invalid(Self::ENV_SKIP_SSL_VALIDATION))?;
            config = config.with_accept_invalid_certs(skip);
        }

        Ok(config)
    }

    /// Overrides the key-set path (default `/token_keys`).
    #[must_use]
    pub fn with_key_set_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.key_set_path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self
    }

    /// Overrides the fetch timeout of the default HTTP client.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Accept invalid TLS certificates from the identity provider.
    #[must_use]
    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Uses a pre-configured HTTP client instead of building one.
    ///
    /// Timeout and TLS settings are then the client's own.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// The identity provider's base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch timeout used when the HTTP client is built here.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The full key-set URL: the base URL (path prefix kept) plus the key-set path.
    pub fn key_set_url(&self) -> Result<Url, KeySetError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{}", self.key_set_path))?)
    }

    /// The supplied HTTP client, or a new one honouring timeout and TLS settings.
    pub(crate) fn http_client(&self) -> Result<reqwest::Client, KeySetError> {
        if let Some(client) = &self.http_client {
            return Ok(client.clone());
        }

        let builder = reqwest::Client::builder().timeout(self.timeout);

        #[cfg(any(feature = "openssl", feature = "rustls"))]
        let builder = builder.danger_accept_invalid_certs(self.accept_invalid_certs);

        builder.build().map_err(KeySetError::HttpClient)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    /// A variable is set to a value that cannot be used.
    #[error("environment variable {0} has an invalid value")]
    Invalid(&'static str),
}
