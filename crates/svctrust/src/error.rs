//! Error types for svctrust
//!
//! Errors fall into three tiers:
//!
//! - [`ConfigError`] - construction-time configuration mistakes. Not retryable;
//!   treat them as startup bugs.
//! - [`SignError`] / [`VerifyError`] - per-call failures. Every way a token can
//!   be untrusted is a [`VerifyError`], so "is this message trustworthy" is a
//!   single `is_ok()` while the variant still tells an operator why.
//! - [`ClientError`] - transport failures from JWKS fetches. Propagated
//!   verbatim; callers decide whether to retry.
//!
//! Certificate and JWKS data problems are split further into encoding errors
//! ([`JwksError`], [`ValidatorError::InvalidCertEncoding`]), PKI errors
//! ([`ValidatorError::PathValidation`], carrying the `webpki` error untouched)
//! and policy errors ([`ValidatorError::CommonNameMismatch`],
//! [`ValidatorError::OrganizationMismatch`]).

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error crossing the key-provider capability seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Construction-time configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A signer was built without a private key provider
    #[error("a private key provider is required")]
    NilKeyProvider,

    /// A verifier was built without a public key provider
    #[error("a public key provider is required")]
    NilPublicKeyProvider,

    /// A verifier was built with an empty trust set
    #[error("at least one trusted issuer is required")]
    NoTrustedIssuers,

    /// A chain validator was built without a CA certificate
    #[error("CA certificate not loaded")]
    CaCertNotLoaded,

    /// A chain validator was built without a usable expected subject
    #[error("expected certificate subject is unknown: {0} is empty")]
    UnknownSubject(&'static str),

    /// The configured CA certificate could not be parsed
    #[error("invalid CA certificate: {0}")]
    InvalidCaCertificate(String),

    /// A configuration input could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that failed to load
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid JSON for the expected shape
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A configured JWKS client could not be created
    #[error("JWKS client configuration failed: {0}")]
    Client(#[from] ClientError),

    /// A configured issuer could not be registered
    #[error("issuer registration failed: {0}")]
    Provider(#[from] ProviderError),
}

/// JWKS document construction and (de)serialization errors
#[derive(Debug, Error)]
pub enum JwksError {
    /// An input carried no certificate, or a decoded document carried no key
    #[error("certificate not found")]
    CertificateNotFound,

    /// Two inputs share one key id
    #[error("duplicate key id: {0}")]
    DuplicateKid(String),

    /// The leaf certificate of an RSA key does not hold an RSA public key
    #[error("certificate does not contain an RSA public key")]
    RsaPublicKeyNotFound,

    /// The key type cannot be published
    #[error("key type {0} is not supported")]
    KeyTypeUnsupported(String),

    /// A required scalar field is blank
    #[error("key {kid:?} is invalid: {field} is blank")]
    BlankField {
        /// Key id of the offending key (may itself be blank)
        kid: String,
        /// JWK member name
        field: &'static str,
    },

    /// A required list is empty or contains blank entries
    #[error("key {kid:?} is invalid: {field} is empty or has blank entries")]
    InvalidList {
        /// Key id of the offending key
        kid: String,
        /// JWK member name
        field: &'static str,
    },

    /// An `x5c` entry is not valid standard base64
    #[error("invalid certificate encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A certificate could not be DER encoded or decoded
    #[error("invalid certificate: {0}")]
    Certificate(#[from] x509_cert::der::Error),

    /// Malformed JSON
    #[error("invalid JWKS JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing a JWKS file failed
    #[error("JWKS I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// X.509 chain and subject validation errors
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// The key carries no certificate chain
    #[error("x5c chain is empty")]
    X5cEmpty,

    /// A chain entry is not valid standard base64
    #[error("x5c[{index}] is not valid base64: {source}")]
    InvalidCertEncoding {
        /// Position in the chain (0 = leaf)
        index: usize,
        /// Decoder error
        #[source]
        source: base64::DecodeError,
    },

    /// A chain entry is not a DER X.509 certificate
    #[error("x5c[{index}] is not a valid X.509 certificate: {source}")]
    ParseCertificateFailed {
        /// Position in the chain (0 = leaf)
        index: usize,
        /// DER decoder error
        #[source]
        source: x509_cert::der::Error,
    },

    /// Certificate-path validation failed (expired, unknown issuer, ...)
    #[error("certificate path validation failed: {0}")]
    PathValidation(#[source] webpki::Error),

    /// The configured CA certificate is outside its own validity window
    #[error("CA certificate is outside its validity window")]
    CaCertExpired,

    /// The leaf's common name / DNS names do not include the expected name
    #[error("certificate common name mismatch: expected {expected:?}, found {found:?}")]
    CommonNameMismatch {
        /// Expected common name
        expected: String,
        /// Names the leaf presented (DNS SANs if any, else the subject CN)
        found: Vec<String>,
    },

    /// The leaf's first organization is missing or differs
    #[error("certificate organization mismatch: expected {expected:?}, found {found:?}")]
    OrganizationMismatch {
        /// Expected organization
        expected: String,
        /// First organization on the leaf, if any
        found: Option<String>,
    },
}

impl ValidatorError {
    /// Whether some certificate on the path was outside its validity window.
    pub fn is_expired(&self) -> bool {
        match self {
            Self::CaCertExpired => true,
            Self::PathValidation(err) => matches!(
                err,
                webpki::Error::CertExpired { .. } | webpki::Error::CertNotValidYet { .. }
            ),
            _ => false,
        }
    }

    /// Whether the chain could not be linked to the configured CA.
    pub fn is_unknown_authority(&self) -> bool {
        matches!(self, Self::PathValidation(webpki::Error::UnknownIssuer))
    }

    /// Whether the chain was sound but the subject policy rejected the leaf.
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::CommonNameMismatch { .. } | Self::OrganizationMismatch { .. }
        )
    }
}

/// JWKS HTTP client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// The endpoint is not an absolute URL with scheme and host
    #[error("invalid JWKS endpoint URL: {0}")]
    InvalidUrl(String),

    /// Network or HTTP protocol failure
    #[error("JWKS request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with something other than 200
    #[error("JWKS endpoint returned status {0}")]
    HttpStatusNotOk(reqwest::StatusCode),

    /// The response body is not a valid JWKS document
    #[error("invalid JWKS document: {0}")]
    Jwks(#[from] JwksError),
}

/// Token signing errors
#[derive(Debug, Error)]
pub enum SignError {
    /// The private key provider failed; its error is passed through unchanged
    #[error(transparent)]
    KeyProvider(BoxError),

    /// The signing key is below the minimum modulus size
    #[error("RSA key too small: {bits} bits (minimum {min})", min = crate::MIN_RSA_KEY_BITS)]
    RsaKeyTooSmall {
        /// Modulus size of the rejected key
        bits: usize,
    },

    /// The private key could not be exported for signing
    #[error("invalid signing key: {0}")]
    InvalidSigningKey(String),

    /// Token encoding failed
    #[error("token encoding failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Reasons a token is rejected before its signature is checked
#[derive(Debug, Error)]
pub enum TokenRejected {
    /// Not a three-segment token with JSON header and claims
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The header declares an algorithm other than PS256
    #[error("unexpected signing method: {0}")]
    UnexpectedSigningMethod(String),

    /// The `iss` or `kid` claim is absent or blank
    #[error("token is missing the iss or kid claim")]
    MissingIssOrKid,

    /// The issuer is not in the verifier's trust set
    #[error("untrusted issuer: {0}")]
    UntrustedIssuer(String),

    /// The public key provider could not resolve the key
    #[error("verification key lookup failed: {0}")]
    KeyProvider(#[source] BoxError),

    /// The resolved verification key is below the minimum modulus size
    #[error("RSA key too small: {bits} bits (minimum {min})", min = crate::MIN_RSA_KEY_BITS)]
    RsaKeyTooSmall {
        /// Modulus size of the rejected key
        bits: usize,
    },
}

/// Token verification errors
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The token could not be parsed or its key could not be trusted
    #[error("token parse failed: {0}")]
    JwtParseFailed(#[from] TokenRejected),

    /// The signature does not match the token contents
    #[error("token signature is invalid")]
    SignatureInvalid(#[source] jsonwebtoken::errors::Error),

    /// The token was hashed with a different algorithm than this verifier uses
    #[error("unsupported hash algorithm: expected {expected:?}, found {found:?}")]
    UnsupportedHashAlgorithm {
        /// This verifier's hash algorithm label
        expected: String,
        /// Label carried by the token
        found: String,
    },

    /// The token carries no body hash
    #[error("token hash claim is missing")]
    HashClaimMissing,

    /// The body does not match the hash the token was signed over
    #[error("message hash does not match token")]
    MessageHashMismatch,
}

/// Verification-key provider errors
#[derive(Debug, Error)]
pub enum ProviderError {
    /// An issuer was registered with a blank name
    #[error("issuer name must not be blank")]
    InvalidIssuer,

    /// No JWKS client is registered for the issuer
    #[error("no JWKS client registered for issuer {0:?}")]
    NoClientFound(String),

    /// The issuer's key set does not contain the key id
    #[error("key id {kid:?} not found for issuer {issuer:?}")]
    KidNotFound {
        /// Issuer that was queried
        issuer: String,
        /// Key id that was requested
        kid: String,
    },

    /// Fetching the issuer's JWKS failed
    #[error(transparent)]
    Fetch(#[from] ClientError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_issuer_classification() {
        let err = ValidatorError::PathValidation(webpki::Error::UnknownIssuer);
        assert!(err.is_unknown_authority());
        assert!(!err.is_expired());
        assert!(!err.is_policy_violation());
    }

    #[test]
    fn test_policy_classification() {
        let err = ValidatorError::OrganizationMismatch {
            expected: "Acme".to_string(),
            found: None,
        };
        assert!(err.is_policy_violation());
        assert!(!err.is_unknown_authority());
    }

    #[test]
    fn test_ca_expiry_counts_as_expired() {
        assert!(ValidatorError::CaCertExpired.is_expired());
    }

    #[test]
    fn test_key_provider_error_is_transparent() {
        let err = SignError::KeyProvider("vault sealed".into());
        assert_eq!(err.to_string(), "vault sealed");
    }

    #[test]
    fn test_parse_failure_wraps_cause() {
        let err = VerifyError::from(TokenRejected::UntrustedIssuer("https://evil".into()));
        assert!(matches!(
            err,
            VerifyError::JwtParseFailed(TokenRejected::UntrustedIssuer(_))
        ));
        assert!(err.to_string().contains("https://evil"));
    }
}
