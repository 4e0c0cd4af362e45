//! # svctrust - Service-to-Service Message Trust
//!
//! A sender signs each outgoing message body into a compact PS256 token; the
//! receiver verifies the token and recomputes the body hash to prove the
//! message was not altered in transit. Verification keys are distributed as a
//! JSON Web Key Set whose entries carry full X.509 chains, and a key is only
//! used after its chain has been validated against a configured CA and
//! subject policy.
//!
//! ## Architecture
//!
//! - [`hasher`] - body digest strategy (SHA-256 by default)
//! - [`jwks`] - JWKS document model: build from certificates, encode, decode
//! - [`x509`] - certificate chain and subject validation
//! - [`client`] - JWKS fetches over HTTP
//! - [`signer`] - token signing with a host-supplied private key source
//! - [`verifier`] - token verification with a host-supplied public key source
//! - [`provider`] - JWKS-backed public key source with a per-issuer cache
//! - [`config`] - serde configuration for trusted issuers
//! - [`error`] - error types
//!
//! ## Policy
//!
//! - Tokens are always PS256 ([`SIGNING_ALGORITHM`]).
//! - RSA keys must be at least [`MIN_RSA_KEY_BITS`] bits, on both sides.
//! - Only issuers in a verifier's trust set are accepted.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use svctrust::{Client, ExpectedSubject, Validator, VerificationKeyProvider, Verifier};
//!
//! # async fn run(ca_pem: &str, token: &str, body: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let provider = VerificationKeyProvider::new();
//! provider.add_issuer(
//!     "https://issuer.example",
//!     Client::new("https://issuer.example/.well-known/jwks.json")?,
//!     Validator::builder()
//!         .ca_certificate_pem(ca_pem)
//!         .subject(ExpectedSubject::new("issuer.example", "Acme"))
//!         .build()?,
//! )?;
//!
//! let verifier = Verifier::builder()
//!     .key_provider(Arc::new(provider))
//!     .trusted_issuers(["https://issuer.example"])
//!     .build()?;
//!
//! verifier.verify(token, body).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod hasher;
pub mod jwks;
pub mod provider;
pub mod signer;
pub mod verifier;
pub mod x509;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

/// Minimum RSA modulus size accepted for signing and verification
pub const MIN_RSA_KEY_BITS: usize = 3072;

/// The only token signature algorithm produced or accepted
pub const SIGNING_ALGORITHM: &str = "PS256";

pub use client::{Client, ClientBuilder};
pub use config::{HttpClientConfig, IssuerConfig, SubjectConfig, TrustConfig};
pub use error::{
    BoxError, ClientError, ConfigError, JwksError, ProviderError, SignError, TokenRejected,
    ValidatorError, VerifyError,
};
pub use hasher::{Hasher, Sha256Hasher};
pub use jwks::{Input, Jwks, Key, KeyType};
pub use provider::VerificationKeyProvider;
pub use signer::{KeyMetadata, PrivateKeyProvider, Signer, SignerBuilder};
pub use verifier::{PublicKeyProvider, Verifier, VerifierBuilder};
pub use x509::{ExpectedSubject, Validator, ValidatorBuilder};

/// Re-exported for implementing the key provider traits
pub use rsa::{RsaPrivateKey, RsaPublicKey};
