//! Trust configuration
//!
//! Declarative description of the issuers a receiver trusts and how to reach
//! their JWKS endpoints. Typically loaded from a JSON file at startup:
//!
//! ```json
//! {
//!   "trusted_issuers": [{
//!     "issuer": "https://issuer.example",
//!     "jwks_url": "https://issuer.example/.well-known/jwks.json",
//!     "ca_cert_path": "/etc/svctrust/issuer-ca.pem",
//!     "subject": { "common_name": "issuer.example", "organization": "Acme" }
//!   }],
//!   "http": { "timeout_secs": 5 }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::{
    Client, DEFAULT_POOL_IDLE_TIMEOUT, DEFAULT_POOL_MAX_IDLE_PER_HOST, DEFAULT_TIMEOUT,
};
use crate::error::ConfigError;
use crate::x509::{ExpectedSubject, Validator};

/// Issuers trusted by a receiver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustConfig {
    /// One entry per trusted issuer
    pub trusted_issuers: Vec<IssuerConfig>,
    /// Transport settings shared by every JWKS client
    #[serde(default)]
    pub http: HttpClientConfig,
}

impl TrustConfig {
    /// Load from a JSON file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`]
    /// if it is not a valid configuration.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Issuer names, for a verifier's trust set
    pub fn issuer_names(&self) -> impl Iterator<Item = &str> {
        self.trusted_issuers.iter().map(|i| i.issuer.as_str())
    }
}

/// One trusted issuer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerConfig {
    /// Value of the `iss` claim
    pub issuer: String,
    /// JWKS publication endpoint
    pub jwks_url: String,
    /// PEM file holding the CA that the issuer's certificates chain to
    pub ca_cert_path: PathBuf,
    /// Subject the issuer's leaf certificates must carry
    pub subject: SubjectConfig,
}

impl IssuerConfig {
    /// Chain validator for this issuer, reading the CA from disk.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the CA file cannot be read; otherwise whatever
    /// [`ValidatorBuilder::build`](crate::x509::ValidatorBuilder::build) rejects.
    pub fn validator(&self) -> Result<Validator, ConfigError> {
        let pem = std::fs::read_to_string(&self.ca_cert_path).map_err(|source| {
            ConfigError::Io {
                path: self.ca_cert_path.clone(),
                source,
            }
        })?;
        Validator::builder()
            .ca_certificate_pem(&pem)
            .subject(self.subject.clone().into())
            .build()
    }

    /// JWKS client for this issuer.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Client`] if the URL is invalid or the transport cannot
    /// be built.
    pub fn client(&self, http: &HttpClientConfig) -> Result<Client, ConfigError> {
        Ok(Client::builder(&self.jwks_url).http_config(http).build()?)
    }
}

/// Expected leaf certificate subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfig {
    /// Common name, or one of the DNS names when the leaf has any
    pub common_name: String,
    /// First Organization attribute
    pub organization: String,
}

impl From<SubjectConfig> for ExpectedSubject {
    fn from(subject: SubjectConfig) -> Self {
        ExpectedSubject::new(subject.common_name, subject.organization)
    }
}

/// JWKS transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum idle connections kept per host
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
    /// Idle connection lifetime in seconds
    #[serde(default = "default_pool_idle_timeout_secs")]
    pub pool_idle_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_pool_max_idle_per_host() -> usize {
    DEFAULT_POOL_MAX_IDLE_PER_HOST
}

fn default_pool_idle_timeout_secs() -> u64 {
    DEFAULT_POOL_IDLE_TIMEOUT.as_secs()
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            pool_idle_timeout_secs: default_pool_idle_timeout_secs(),
        }
    }
}

impl HttpClientConfig {
    /// Request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Idle connection lifetime
    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }
}
