//! Common test utilities for integration tests
//!
//! Provides a mock JWKS publication endpoint plus helpers to wire a signer
//! and a JWKS-backed verifier against it.

#![allow(dead_code)]

use std::sync::Arc;

use svctrust::test_utils::{Leaf, LeafSpec, StaticKeyProvider, TestPki, rsa_key_3072};
use svctrust::{
    Client, ExpectedSubject, Jwks, Signer, Validator, VerificationKeyProvider, Verifier,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const ISSUER: &str = "https://issuer.example";
pub const COMMON_NAME: &str = "issuer.example";
pub const ORGANIZATION: &str = "Acme";

/// Mock JWKS endpoint for one issuer
pub struct MockJwksServer {
    pub server: MockServer,
    pub jwks_endpoint: String,
}

impl MockJwksServer {
    /// Start a new mock endpoint
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let jwks_endpoint = format!("{}/.well-known/jwks.json", server.uri());
        Self {
            server,
            jwks_endpoint,
        }
    }

    /// Serve `jwks` for every request
    pub async fn mock_jwks(&self, jwks: &Jwks) {
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
            .mount(&self.server)
            .await;
    }

    /// Serve `jwks` for the next `times` requests, and expect exactly that many
    pub async fn mock_jwks_times(&self, jwks: &Jwks, times: u64) {
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
            .up_to_n_times(times)
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Fail the test if the endpoint is ever contacted
    pub async fn expect_no_fetch(&self) {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&self.server)
            .await;
    }

    /// Answer every request with `status`
    pub async fn mock_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Client for this endpoint
    pub fn client(&self) -> Client {
        Client::new(&self.jwks_endpoint).expect("valid endpoint")
    }
}

/// A PKI plus a leaf issued to the test issuer
pub struct IssuerPki {
    pub pki: TestPki,
    pub leaf: Leaf,
}

impl IssuerPki {
    pub fn new() -> Self {
        let pki = TestPki::new();
        let leaf = pki.leaf(LeafSpec::new(COMMON_NAME, ORGANIZATION, rsa_key_3072()));
        Self { pki, leaf }
    }

    /// Validator trusting this PKI's root with the test subject
    pub fn validator(&self) -> Validator {
        Validator::new(
            self.pki.root_der(),
            ExpectedSubject::new(COMMON_NAME, ORGANIZATION),
        )
        .expect("validator")
    }

    /// Signer using the leaf key as `(ISSUER, kid)`
    pub fn signer(&self, kid: &str) -> Signer {
        Signer::new(Arc::new(StaticKeyProvider::new(
            self.leaf.key.clone(),
            ISSUER,
            kid,
        )))
    }
}

/// Provider with `ISSUER` registered against `server`
pub fn provider(server: &MockJwksServer, issuer: &IssuerPki) -> Arc<VerificationKeyProvider> {
    let provider = VerificationKeyProvider::new();
    provider
        .add_issuer(ISSUER, server.client(), issuer.validator())
        .expect("issuer registers");
    Arc::new(provider)
}

/// Verifier trusting only `ISSUER`, backed by `provider`
pub fn verifier(provider: Arc<VerificationKeyProvider>) -> Verifier {
    Verifier::builder()
        .key_provider(provider)
        .trusted_issuers([ISSUER])
        .build()
        .expect("verifier")
}
