//! Token signing
//!
//! A [`Signer`] asks its [`PrivateKeyProvider`] for the current key on every
//! call, hashes the message body and emits a compact PS256 token whose claims
//! bind the issuer, key id and body hash together.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use svctrust::signer::{PrivateKeyProvider, Signer};
//! # async fn example(keys: Arc<dyn PrivateKeyProvider>) -> Result<(), Box<dyn std::error::Error>> {
//! let signer = Signer::builder().key_provider(keys).build()?;
//! let token = signer.sign(b"payload").await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode, get_current_timestamp};
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey as _;
use rsa::traits::PublicKeyParts as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::MIN_RSA_KEY_BITS;
use crate::error::{BoxError, ConfigError, SignError};
use crate::hasher::{Hasher, Sha256Hasher};

/// Identity a signed token asserts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyMetadata {
    /// Issuer (`iss` claim)
    pub iss: String,
    /// Key id (`kid` claim)
    pub kid: String,
}

impl KeyMetadata {
    /// Metadata for `(iss, kid)`
    pub fn new(iss: impl Into<String>, kid: impl Into<String>) -> Self {
        Self {
            iss: iss.into(),
            kid: kid.into(),
        }
    }
}

/// Source of the signing key currently in use.
///
/// Called once per [`Signer::sign`]; implementations decide how keys are
/// stored and rotated. Errors are passed back to the caller unchanged.
#[async_trait]
pub trait PrivateKeyProvider: Send + Sync {
    /// The current signing key and the identity it signs as.
    async fn current_signing_key(&self) -> Result<(RsaPrivateKey, KeyMetadata), BoxError>;
}

/// Claims written into every signed token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedClaims {
    /// Issuer
    pub iss: String,
    /// Key id of the signing key
    pub kid: String,
    /// Digest of the message body
    pub hash: String,
    /// Label of the digest algorithm
    #[serde(rename = "hash-alg")]
    pub hash_alg: String,
    /// Issued-at, seconds since the Unix epoch
    pub iat: u64,
}

/// Builder for [`Signer`]
#[derive(Default)]
pub struct SignerBuilder {
    key_provider: Option<Arc<dyn PrivateKeyProvider>>,
    hasher: Option<Arc<dyn Hasher>>,
}

impl SignerBuilder {
    /// Set the private key source (required)
    pub fn key_provider(mut self, provider: Arc<dyn PrivateKeyProvider>) -> Self {
        self.key_provider = Some(provider);
        self
    }

    /// Override the body hasher (defaults to SHA-256)
    pub fn hasher(mut self, hasher: Arc<dyn Hasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Build the signer.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NilKeyProvider`] if no key provider was set.
    pub fn build(self) -> Result<Signer, ConfigError> {
        let key_provider = self.key_provider.ok_or(ConfigError::NilKeyProvider)?;
        Ok(Signer {
            key_provider,
            hasher: self.hasher.unwrap_or_else(|| Arc::new(Sha256Hasher)),
        })
    }
}

/// Produces PS256 tokens bound to message bodies
#[derive(Clone)]
pub struct Signer {
    key_provider: Arc<dyn PrivateKeyProvider>,
    hasher: Arc<dyn Hasher>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("hash_alg", &self.hasher.algorithm())
            .finish_non_exhaustive()
    }
}

impl Signer {
    /// Start building a signer
    pub fn builder() -> SignerBuilder {
        SignerBuilder::default()
    }

    /// Signer with the default SHA-256 hasher
    pub fn new(key_provider: Arc<dyn PrivateKeyProvider>) -> Self {
        Self {
            key_provider,
            hasher: Arc::new(Sha256Hasher),
        }
    }

    /// Sign `body`, returning a compact token.
    ///
    /// # Errors
    ///
    /// - [`SignError::KeyProvider`] if the key source fails
    /// - [`SignError::RsaKeyTooSmall`] if the key is under 3072 bits
    /// - [`SignError::InvalidSigningKey`] / [`SignError::Jwt`] if encoding fails
    pub async fn sign(&self, body: &[u8]) -> Result<String, SignError> {
        let (key, metadata) = self
            .key_provider
            .current_signing_key()
            .await
            .map_err(SignError::KeyProvider)?;

        let bits = key.n().bits();
        if bits < MIN_RSA_KEY_BITS {
            return Err(SignError::RsaKeyTooSmall { bits });
        }

        let der = key
            .to_pkcs1_der()
            .map_err(|e| SignError::InvalidSigningKey(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_der(der.as_bytes());

        let claims = SignedClaims {
            iss: metadata.iss,
            kid: metadata.kid,
            hash: self.hasher.hash(body),
            hash_alg: self.hasher.algorithm().to_string(),
            iat: get_current_timestamp(),
        };

        // Header::new sets typ "JWT"
        let token = encode(&Header::new(Algorithm::PS256), &claims, &encoding_key)?;

        debug!(
            issuer = %claims.iss,
            kid = %claims.kid,
            hash_alg = %claims.hash_alg,
            "Signed message token"
        );

        Ok(token)
    }
}
