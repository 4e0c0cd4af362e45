//! JWKS HTTP client
//!
//! Fetches an issuer's key set from its publication endpoint. There is no
//! caching or retry here; [`VerificationKeyProvider`](crate::provider::VerificationKeyProvider)
//! decides when to fetch.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::{error, info};
use url::Url;

use crate::config::HttpClientConfig;
use crate::error::ClientError;
use crate::jwks::Jwks;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default idle connections kept per host
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 20;
/// Default idle connection lifetime
pub const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

type Configure = Box<dyn FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder + Send>;

/// Builder for [`Client`]
pub struct ClientBuilder {
    endpoint: String,
    timeout: Duration,
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Duration,
    configure: Vec<Configure>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .field("pool_idle_timeout", &self.pool_idle_timeout)
            .field("configure", &self.configure.len())
            .finish()
    }
}

impl ClientBuilder {
    /// Request timeout (default 10s)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum idle connections per host (default 20)
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// How long idle connections are kept (default 30s)
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    /// Apply the pool and timeout values from `config`
    pub fn http_config(self, config: &HttpClientConfig) -> Self {
        self.timeout(config.timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout())
    }

    /// Further adjust the transport after the defaults are applied.
    ///
    /// Hooks run in registration order.
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder + Send + 'static,
    {
        self.configure.push(Box::new(f));
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidUrl`] unless the endpoint is an absolute URL
    ///   with a scheme and host
    /// - [`ClientError::Transport`] if the HTTP transport cannot be created
    pub fn build(self) -> Result<Client, ClientError> {
        let endpoint = Url::parse(&self.endpoint)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {e}", self.endpoint)))?;
        if endpoint.host_str().is_none_or(str::is_empty) {
            return Err(ClientError::InvalidUrl(format!(
                "{}: missing host",
                self.endpoint
            )));
        }

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .pool_idle_timeout(self.pool_idle_timeout);
        for configure in self.configure {
            builder = configure(builder);
        }

        Ok(Client {
            endpoint,
            http_client: builder.build()?,
        })
    }
}

/// Fetches a JWKS document from one endpoint
#[derive(Debug, Clone)]
pub struct Client {
    endpoint: Url,
    http_client: reqwest::Client,
}

impl Client {
    /// Client for `endpoint` with default transport settings.
    ///
    /// # Errors
    ///
    /// See [`ClientBuilder::build`].
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder(endpoint).build()
    }

    /// Start building a client for `endpoint`
    pub fn builder(endpoint: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            configure: Vec::new(),
        }
    }

    /// The JWKS endpoint
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Fetch and decode the key set.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Transport`] on network failure
    /// - [`ClientError::HttpStatusNotOk`] on any status other than 200
    /// - [`ClientError::Jwks`] if the body is not a valid JWKS document
    pub async fn get(&self) -> Result<Jwks, ClientError> {
        info!(jwks_uri = %self.endpoint, "Fetching JWKS from endpoint");

        let response = self
            .http_client
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(|e| {
                error!(jwks_uri = %self.endpoint, error = %e, "Failed to fetch JWKS");
                e
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            error!(
                jwks_uri = %self.endpoint,
                status = %status,
                "JWKS endpoint returned error status"
            );
            return Err(ClientError::HttpStatusNotOk(status));
        }

        let body = response.bytes().await?;
        let jwks = Jwks::from_slice(&body).map_err(|e| {
            error!(jwks_uri = %self.endpoint, error = %e, "Failed to parse JWKS JSON");
            e
        })?;

        info!(
            jwks_uri = %self.endpoint,
            key_count = jwks.len(),
            "Successfully fetched JWKS"
        );

        Ok(jwks)
    }
}
