//! Token verification
//!
//! [`Verifier::verify`] accepts a token only if all of these hold: it is a
//! PS256 token, its issuer is trusted, its key resolves to an RSA key of at
//! least 3072 bits, its signature is valid and its `hash` claim matches the
//! body it arrived with.
//!
//! Everything that goes wrong before the signature check (malformed token,
//! wrong algorithm, untrusted issuer, key lookup failure, weak key) surfaces
//! as [`VerifyError::JwtParseFailed`] wrapping a [`TokenRejected`] cause.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use rsa::RsaPublicKey;
use rsa::traits::PublicKeyParts as _;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use subtle::ConstantTimeEq as _;
use tracing::{debug, warn};

use crate::error::{BoxError, ConfigError, TokenRejected, VerifyError};
use crate::hasher::{Hasher, Sha256Hasher};
use crate::{MIN_RSA_KEY_BITS, SIGNING_ALGORITHM};

/// Resolves the public key for an `(issuer, kid)` pair.
///
/// [`VerificationKeyProvider`](crate::provider::VerificationKeyProvider) is
/// the JWKS-backed implementation; hosts may supply their own.
#[async_trait]
pub trait PublicKeyProvider: Send + Sync {
    /// Public key `kid` published by `issuer`.
    async fn verification_key(&self, issuer: &str, kid: &str) -> Result<RsaPublicKey, BoxError>;
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    #[serde(default)]
    alg: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TokenClaims {
    iss: Option<String>,
    kid: Option<String>,
    hash: Option<String>,
    #[serde(rename = "hash-alg")]
    hash_alg: Option<String>,
}

/// Builder for [`Verifier`]
#[derive(Default)]
pub struct VerifierBuilder {
    key_provider: Option<Arc<dyn PublicKeyProvider>>,
    hasher: Option<Arc<dyn Hasher>>,
    trusted_issuers: HashSet<String>,
}

impl VerifierBuilder {
    /// Set the public key source (required)
    pub fn key_provider(mut self, provider: Arc<dyn PublicKeyProvider>) -> Self {
        self.key_provider = Some(provider);
        self
    }

    /// Override the body hasher (defaults to SHA-256)
    pub fn hasher(mut self, hasher: Arc<dyn Hasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Add issuers to the trust set. Blank names are ignored.
    pub fn trusted_issuers<I, S>(mut self, issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trusted_issuers.extend(
            issuers
                .into_iter()
                .map(Into::into)
                .filter(|issuer| !issuer.trim().is_empty()),
        );
        self
    }

    /// Build the verifier.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NilPublicKeyProvider`] if no key provider was set
    /// - [`ConfigError::NoTrustedIssuers`] if the trust set is empty
    pub fn build(self) -> Result<Verifier, ConfigError> {
        let key_provider = self.key_provider.ok_or(ConfigError::NilPublicKeyProvider)?;
        if self.trusted_issuers.is_empty() {
            return Err(ConfigError::NoTrustedIssuers);
        }

        let mut validation = Validation::new(Algorithm::PS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_aud = false;

        Ok(Verifier {
            key_provider,
            hasher: self.hasher.unwrap_or_else(|| Arc::new(Sha256Hasher)),
            trusted_issuers: self.trusted_issuers,
            validation,
        })
    }
}

/// Verifies tokens produced by [`Signer`](crate::signer::Signer)
#[derive(Clone)]
pub struct Verifier {
    key_provider: Arc<dyn PublicKeyProvider>,
    hasher: Arc<dyn Hasher>,
    trusted_issuers: HashSet<String>,
    validation: Validation,
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("hash_alg", &self.hasher.algorithm())
            .field("trusted_issuers", &self.trusted_issuers)
            .finish_non_exhaustive()
    }
}

impl Verifier {
    /// Start building a verifier
    pub fn builder() -> VerifierBuilder {
        VerifierBuilder::default()
    }

    /// Whether tokens from `issuer` are accepted
    pub fn trusts(&self, issuer: &str) -> bool {
        self.trusted_issuers.contains(issuer)
    }

    /// Verify `token` and its binding to `body`.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::JwtParseFailed`] if the token or its key is not trusted
    /// - [`VerifyError::SignatureInvalid`] if the signature does not verify
    /// - [`VerifyError::UnsupportedHashAlgorithm`] if `hash-alg` differs from
    ///   this verifier's hasher
    /// - [`VerifyError::HashClaimMissing`] if the token has no `hash`
    /// - [`VerifyError::MessageHashMismatch`] if `body` was not what was signed
    pub async fn verify(&self, token: &str, body: &[u8]) -> Result<(), VerifyError> {
        let decoding_key = self.resolve_key(token).await?;

        let claims = match decode::<TokenClaims>(token, &decoding_key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) if matches!(e.kind(), ErrorKind::InvalidSignature) => {
                warn!("Token signature is invalid");
                return Err(VerifyError::SignatureInvalid(e));
            }
            Err(e) => return Err(TokenRejected::Malformed(e.to_string()).into()),
        };

        let expected_alg = self.hasher.algorithm();
        let hash_alg = claims.hash_alg.unwrap_or_default();
        if hash_alg != expected_alg {
            return Err(VerifyError::UnsupportedHashAlgorithm {
                expected: expected_alg.to_string(),
                found: hash_alg,
            });
        }

        let claimed = claims
            .hash
            .filter(|hash| !hash.is_empty())
            .ok_or(VerifyError::HashClaimMissing)?;

        let actual = self.hasher.hash(body);
        if !bool::from(actual.as_bytes().ct_eq(claimed.as_bytes())) {
            warn!(issuer = ?claims.iss, kid = ?claims.kid, "Message hash mismatch");
            return Err(VerifyError::MessageHashMismatch);
        }

        debug!(issuer = ?claims.iss, kid = ?claims.kid, "Message token verified");
        Ok(())
    }

    /// Checks that run before the signature: algorithm, identity, trust, key.
    async fn resolve_key(&self, token: &str) -> Result<DecodingKey, TokenRejected> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(_), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenRejected::Malformed(
                "expected three dot-separated segments".to_string(),
            ));
        };

        let header: RawHeader = decode_segment(header, "header")?;
        let alg = header.alg.unwrap_or_default();
        if alg != SIGNING_ALGORITHM {
            return Err(TokenRejected::UnexpectedSigningMethod(alg));
        }

        let claims: TokenClaims = decode_segment(payload, "claims")?;
        let (Some(issuer), Some(kid)) = (
            claims.iss.filter(|s| !s.trim().is_empty()),
            claims.kid.filter(|s| !s.trim().is_empty()),
        ) else {
            return Err(TokenRejected::MissingIssOrKid);
        };

        if !self.trusted_issuers.contains(&issuer) {
            warn!(issuer = %issuer, "Token from untrusted issuer");
            return Err(TokenRejected::UntrustedIssuer(issuer));
        }

        let key = self
            .key_provider
            .verification_key(&issuer, &kid)
            .await
            .map_err(TokenRejected::KeyProvider)?;

        let bits = key.n().bits();
        if bits < MIN_RSA_KEY_BITS {
            warn!(issuer = %issuer, kid = %kid, bits, "Verification key too small");
            return Err(TokenRejected::RsaKeyTooSmall { bits });
        }

        Ok(DecodingKey::from_rsa_raw_components(
            &key.n().to_bytes_be(),
            &key.e().to_bytes_be(),
        ))
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T, TokenRejected> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenRejected::Malformed(format!("invalid {what} encoding: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| TokenRejected::Malformed(format!("invalid {what}: {e}")))
}
