//! Attack scenarios against the verification path
//!
//! Each test plays a hostile sender or a hostile/misconfigured JWKS publisher
//! and checks that the receiver refuses the message for the right reason.

mod common;

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use common::{COMMON_NAME, ISSUER, IssuerPki, MockJwksServer, ORGANIZATION, provider, verifier};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey as _;
use svctrust::test_utils::{LeafSpec, StaticKeyProvider, TestPki, rsa_key_2048, rsa_key_3072_alt};
use svctrust::{Hasher as _, Sha256Hasher, Signer, TokenRejected, VerifyError};

fn forge(key: &RsaPrivateKey, alg: Algorithm, claims: &serde_json::Value) -> String {
    let der = key.to_pkcs1_der().expect("pkcs1");
    encode(
        &Header::new(alg),
        claims,
        &EncodingKey::from_rsa_der(der.as_bytes()),
    )
    .expect("encode")
}

fn claims(kid: &str, body: &[u8]) -> serde_json::Value {
    serde_json::json!({
        "iss": ISSUER,
        "kid": kid,
        "hash": Sha256Hasher.hash(body),
        "hash-alg": "SHA256",
    })
}

/// Unsigned token (`alg: none`) is refused before any key lookup
#[tokio::test]
async fn test_alg_none() {
    let issuer = IssuerPki::new();
    let server = MockJwksServer::start().await;
    server.expect_no_fetch().await;
    let verifier = verifier(provider(&server, &issuer));

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims("k1", b"payload").to_string());
    let token = format!("{header}.{payload}.");

    let err = verifier.verify(&token, b"payload").await.unwrap_err();
    assert!(matches!(
        err,
        VerifyError::JwtParseFailed(TokenRejected::UnexpectedSigningMethod(_))
    ));
}

/// PKCS#1 v1.5 signature with the genuine key is still the wrong algorithm
#[tokio::test]
async fn test_rs256_downgrade() {
    let issuer = IssuerPki::new();
    let server = MockJwksServer::start().await;
    server.mock_jwks(&issuer.leaf.jwks("k1")).await;
    let verifier = verifier(provider(&server, &issuer));

    let token = forge(&issuer.leaf.key, Algorithm::RS256, &claims("k1", b"payload"));
    let err = verifier.verify(&token, b"payload").await.unwrap_err();
    assert!(matches!(
        err,
        VerifyError::JwtParseFailed(TokenRejected::UnexpectedSigningMethod(alg)) if alg == "RS256"
    ));
}

/// Attacker signs with their own key but claims the trusted issuer's kid
#[tokio::test]
async fn test_impersonation_with_foreign_key() {
    let issuer = IssuerPki::new();
    let server = MockJwksServer::start().await;
    server.mock_jwks(&issuer.leaf.jwks("k1")).await;
    let verifier = verifier(provider(&server, &issuer));

    let token = forge(&rsa_key_3072_alt(), Algorithm::PS256, &claims("k1", b"payload"));
    let err = verifier.verify(&token, b"payload").await.unwrap_err();
    assert!(matches!(err, VerifyError::SignatureInvalid(_)));
}

/// A valid token from an issuer outside the trust set is refused
#[tokio::test]
async fn test_untrusted_issuer_with_valid_key() {
    let issuer = IssuerPki::new();
    let server = MockJwksServer::start().await;
    server.expect_no_fetch().await;
    let verifier = verifier(provider(&server, &issuer));

    let rogue = Signer::new(Arc::new(StaticKeyProvider::new(
        issuer.leaf.key.clone(),
        "https://rogue.example",
        "k1",
    )));
    let token = rogue.sign(b"payload").await.unwrap();

    let err = verifier.verify(&token, b"payload").await.unwrap_err();
    assert!(matches!(
        err,
        VerifyError::JwtParseFailed(TokenRejected::UntrustedIssuer(_))
    ));
}

/// Publisher serves a properly chained but weak (2048-bit) key
#[tokio::test]
async fn test_weak_key_in_valid_chain() {
    let pki = TestPki::new();
    let weak = pki.leaf(LeafSpec::new(COMMON_NAME, ORGANIZATION, rsa_key_2048()));
    let issuer = IssuerPki {
        pki,
        leaf: weak.clone(),
    };
    let server = MockJwksServer::start().await;
    server.mock_jwks(&weak.jwks("k1")).await;
    let verifier = verifier(provider(&server, &issuer));

    let token = forge(&weak.key, Algorithm::PS256, &claims("k1", b"payload"));
    let err = verifier.verify(&token, b"payload").await.unwrap_err();
    assert!(matches!(
        err,
        VerifyError::JwtParseFailed(TokenRejected::RsaKeyTooSmall { bits: 2048 })
    ));
}

/// Publisher swaps in a leaf from another CA under the same kid
#[tokio::test]
async fn test_key_from_foreign_ca_is_never_trusted() {
    let issuer = IssuerPki::new();
    let foreign = TestPki::new().leaf(LeafSpec::new(COMMON_NAME, ORGANIZATION, rsa_key_3072_alt()));
    let server = MockJwksServer::start().await;
    server.mock_jwks(&foreign.jwks("k1")).await;
    let verifier = verifier(provider(&server, &issuer));

    let token = forge(&foreign.key, Algorithm::PS256, &claims("k1", b"payload"));
    let err = verifier.verify(&token, b"payload").await.unwrap_err();
    assert!(matches!(
        err,
        VerifyError::JwtParseFailed(TokenRejected::KeyProvider(_))
    ));
}

/// Same CA, wrong subject: a sibling service cannot sign as the issuer
#[tokio::test]
async fn test_sibling_certificate_rejected_by_subject_policy() {
    let issuer = IssuerPki::new();
    let sibling = issuer
        .pki
        .leaf(LeafSpec::new("billing.example", ORGANIZATION, rsa_key_3072_alt()));
    let server = MockJwksServer::start().await;
    server.mock_jwks(&sibling.jwks("k1")).await;
    let verifier = verifier(provider(&server, &issuer));

    let token = forge(&sibling.key, Algorithm::PS256, &claims("k1", b"payload"));
    let err = verifier.verify(&token, b"payload").await.unwrap_err();
    assert!(matches!(
        err,
        VerifyError::JwtParseFailed(TokenRejected::KeyProvider(_))
    ));
}

/// Claims re-encoded after signing break the signature
#[tokio::test]
async fn test_claims_tampering() {
    let issuer = IssuerPki::new();
    let server = MockJwksServer::start().await;
    server.mock_jwks(&issuer.leaf.jwks("k1")).await;
    let verifier = verifier(provider(&server, &issuer));

    let token = issuer.signer("k1").sign(b"transfer 10").await.unwrap();
    let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
    parts[1] = URL_SAFE_NO_PAD.encode(claims("k1", b"transfer 1000").to_string());

    let err = verifier
        .verify(&parts.join("."), b"transfer 1000")
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::SignatureInvalid(_)));
}
