//! Per-issuer verification-key cache
//!
//! [`VerificationKeyProvider`] resolves `(issuer, kid)` to an RSA public key by
//! pulling the issuer's JWKS, validating every key's certificate chain and
//! caching the keys that survive. It is a lazy pull-through cache: nothing is
//! fetched until a lookup misses, and nothing is refreshed in the background.
//!
//! # Locking
//!
//! Each issuer has its own [`tokio::sync::RwLock`] around its `kid -> key`
//! map. Hits take the read lock. A miss takes the write lock, re-checks the
//! map and only then fetches, so concurrent misses for one issuer cause a
//! single HTTP request. While that request is in flight every lookup for the
//! same issuer waits; other issuers are unaffected.
//!
//! A refresh replaces the whole map, but only if it produced at least one
//! usable key. A refresh that yields nothing usable leaves the previous keys
//! in place.
//!
//! Cached keys are not re-validated: a key stays trusted until a miss for
//! that issuer triggers the next refresh.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rsa::RsaPublicKey;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::config::TrustConfig;
use crate::error::{BoxError, ConfigError, ProviderError};
use crate::jwks::{Jwks, KeyType, rsa_public_key};
use crate::verifier::PublicKeyProvider;
use crate::x509::Validator;

struct IssuerKeys {
    client: Client,
    validator: Validator,
    cache: tokio::sync::RwLock<HashMap<String, RsaPublicKey>>,
}

impl IssuerKeys {
    /// Keys in `jwks` whose chains validate, keyed by kid.
    fn usable_keys(&self, issuer: &str, jwks: &Jwks) -> HashMap<String, RsaPublicKey> {
        let mut usable = HashMap::new();

        for key in &jwks.keys {
            if key.kty != KeyType::Rsa.as_str() {
                warn!(issuer, kid = %key.kid, kty = %key.kty, "Dropping JWKS key: unsupported key type");
                continue;
            }

            let leaf = match self.validator.validate(&key.x5c) {
                Ok(leaf) => leaf,
                Err(e) => {
                    warn!(
                        issuer,
                        kid = %key.kid,
                        error = %e,
                        expired = e.is_expired(),
                        unknown_authority = e.is_unknown_authority(),
                        policy_violation = e.is_policy_violation(),
                        "Dropping JWKS key: certificate chain rejected"
                    );
                    continue;
                }
            };

            match rsa_public_key(&leaf) {
                Ok(public_key) => {
                    usable.entry(key.kid.clone()).or_insert(public_key);
                }
                Err(e) => {
                    warn!(issuer, kid = %key.kid, error = %e, "Dropping JWKS key");
                }
            }
        }

        usable
    }
}

/// JWKS-backed [`PublicKeyProvider`] with a per-issuer key cache
#[derive(Default)]
pub struct VerificationKeyProvider {
    issuers: RwLock<HashMap<String, Arc<IssuerKeys>>>,
}

impl std::fmt::Debug for VerificationKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let issuers = self.issuers.read();
        f.debug_struct("VerificationKeyProvider")
            .field("issuers", &issuers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl VerificationKeyProvider {
    /// A provider with no issuers
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a provider for every issuer in `config`.
    ///
    /// # Errors
    ///
    /// Fails on the first issuer whose CA file, subject, URL or name is
    /// unusable.
    pub fn from_config(config: &TrustConfig) -> Result<Self, ConfigError> {
        let provider = Self::new();
        for issuer in &config.trusted_issuers {
            let client = issuer.client(&config.http)?;
            let validator = issuer.validator()?;
            provider.add_issuer(&issuer.issuer, client, validator)?;
        }
        Ok(provider)
    }

    /// Register `issuer`, replacing any previous registration and its cache.
    ///
    /// # Errors
    ///
    /// [`ProviderError::InvalidIssuer`] if the name is blank.
    pub fn add_issuer(
        &self,
        issuer: impl Into<String>,
        client: Client,
        validator: Validator,
    ) -> Result<(), ProviderError> {
        let issuer = issuer.into();
        if issuer.trim().is_empty() {
            return Err(ProviderError::InvalidIssuer);
        }

        info!(issuer = %issuer, jwks_uri = %client.endpoint(), "Registered JWKS issuer");
        self.issuers.write().insert(
            issuer,
            Arc::new(IssuerKeys {
                client,
                validator,
                cache: tokio::sync::RwLock::new(HashMap::new()),
            }),
        );
        Ok(())
    }

    /// Registered issuer names
    pub fn issuers(&self) -> Vec<String> {
        self.issuers.read().keys().cloned().collect()
    }

    /// Key ids currently cached for `issuer`, sorted.
    ///
    /// Unknown issuers have none.
    pub async fn cached_kids(&self, issuer: &str) -> Vec<String> {
        let Some(state) = self.issuer_state(issuer) else {
            return Vec::new();
        };
        let mut kids: Vec<String> = state.cache.read().await.keys().cloned().collect();
        kids.sort();
        kids
    }

    /// Resolve the public key `kid` published by `issuer`.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::NoClientFound`] - `issuer` is not registered
    /// - [`ProviderError::Fetch`] - the JWKS fetch failed (status, transport or body)
    /// - [`ProviderError::KidNotFound`] - no validated key carries `kid`
    pub async fn verification_key(
        &self,
        issuer: &str,
        kid: &str,
    ) -> Result<RsaPublicKey, ProviderError> {
        let state = self
            .issuer_state(issuer)
            .ok_or_else(|| ProviderError::NoClientFound(issuer.to_string()))?;

        if let Some(key) = state.cache.read().await.get(kid) {
            debug!(issuer, kid, "Verification key cache hit");
            return Ok(key.clone());
        }

        let mut cache = state.cache.write().await;
        // another caller may have refreshed while we waited for the lock
        if let Some(key) = cache.get(kid) {
            debug!(issuer, kid, "Verification key cached by concurrent refresh");
            return Ok(key.clone());
        }

        let jwks = state.client.get().await?;
        let usable = state.usable_keys(issuer, &jwks);

        if usable.is_empty() {
            warn!(
                issuer,
                fetched = jwks.len(),
                retained = cache.len(),
                "JWKS refresh produced no usable keys; keeping cached keys"
            );
        } else {
            info!(
                issuer,
                fetched = jwks.len(),
                usable = usable.len(),
                "Refreshed verification keys"
            );
            *cache = usable;
        }

        cache
            .get(kid)
            .cloned()
            .ok_or_else(|| ProviderError::KidNotFound {
                issuer: issuer.to_string(),
                kid: kid.to_string(),
            })
    }

    fn issuer_state(&self, issuer: &str) -> Option<Arc<IssuerKeys>> {
        self.issuers.read().get(issuer).cloned()
    }
}

#[async_trait]
impl PublicKeyProvider for VerificationKeyProvider {
    async fn verification_key(&self, issuer: &str, kid: &str) -> Result<RsaPublicKey, BoxError> {
        VerificationKeyProvider::verification_key(self, issuer, kid)
            .await
            .map_err(Into::into)
    }
}
