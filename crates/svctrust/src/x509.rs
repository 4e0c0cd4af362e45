//! X.509 chain validation for JWKS keys
//!
//! A key is only usable once its `x5c` chain has been verified:
//!
//! 1. every entry decodes (standard base64, DER X.509);
//! 2. the leaf chains to the configured CA through the supplied
//!    intermediates, honoring validity windows and basic constraints
//!    (`rustls-webpki`);
//! 3. the leaf satisfies the expected subject policy.
//!
//! # Subject policy
//!
//! If the leaf carries DNS subject alternative names, the expected common
//! name must be one of them; the subject CN is not consulted in that case.
//! Otherwise the expected name must equal a subject CN. In both cases the
//! leaf's first Organization must equal the expected organization.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use const_oid::ObjectIdentifier;
use rustls_pki_types::{CertificateDer, UnixTime};
use tracing::debug;
use webpki::{EndEntityCert, KeyUsage};
use x509_cert::Certificate;
use x509_cert::der::asn1::{Any, Ia5StringRef, PrintableStringRef, Utf8StringRef};
use x509_cert::der::{Decode as _, DecodePem as _, Encode as _};
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::ext::pkix::name::GeneralName;

use crate::error::{ConfigError, ValidatorError};

const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");

/// Subject a leaf certificate must present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedSubject {
    /// Common name, matched against DNS SANs when the leaf has any
    pub common_name: String,
    /// First Organization attribute of the leaf subject
    pub organization: String,
}

impl ExpectedSubject {
    /// Create an expected subject
    pub fn new(common_name: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            organization: organization.into(),
        }
    }
}

/// Certificate chain validator for one issuer
#[derive(Debug, Clone)]
pub struct Validator {
    ca_der: CertificateDer<'static>,
    ca_not_before: Duration,
    ca_not_after: Duration,
    subject: ExpectedSubject,
}

/// Builder for [`Validator`]
#[derive(Debug, Default)]
pub struct ValidatorBuilder {
    ca_der: Option<Vec<u8>>,
    ca_pem_error: Option<String>,
    subject: Option<ExpectedSubject>,
}

impl ValidatorBuilder {
    /// Trust the CA certificate given as DER
    pub fn ca_certificate_der(mut self, der: impl Into<Vec<u8>>) -> Self {
        self.ca_der = Some(der.into());
        self
    }

    /// Trust the CA certificate given as PEM
    pub fn ca_certificate_pem(mut self, pem: &str) -> Self {
        match Certificate::from_pem(pem).and_then(|cert| cert.to_der()) {
            Ok(der) => self.ca_der = Some(der),
            Err(e) => self.ca_pem_error = Some(e.to_string()),
        }
        self
    }

    /// Subject policy for leaf certificates
    pub fn subject(mut self, subject: ExpectedSubject) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Build the validator.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidCaCertificate`] - the CA cannot be parsed or used as a trust anchor
    /// - [`ConfigError::CaCertNotLoaded`] - no CA certificate was supplied
    /// - [`ConfigError::UnknownSubject`] - no subject, or a blank CN / Organization
    pub fn build(self) -> Result<Validator, ConfigError> {
        if let Some(err) = self.ca_pem_error {
            return Err(ConfigError::InvalidCaCertificate(err));
        }
        let ca_der = self.ca_der.ok_or(ConfigError::CaCertNotLoaded)?;

        let subject = self.subject.ok_or(ConfigError::UnknownSubject("subject"))?;
        if subject.common_name.trim().is_empty() {
            return Err(ConfigError::UnknownSubject("common name"));
        }
        if subject.organization.trim().is_empty() {
            return Err(ConfigError::UnknownSubject("organization"));
        }

        let ca = Certificate::from_der(&ca_der)
            .map_err(|e| ConfigError::InvalidCaCertificate(e.to_string()))?;
        let validity = &ca.tbs_certificate.validity;
        let ca_not_before = validity.not_before.to_unix_duration();
        let ca_not_after = validity.not_after.to_unix_duration();

        let ca_der = CertificateDer::from(ca_der);
        webpki::anchor_from_trusted_cert(&ca_der)
            .map_err(|e| ConfigError::InvalidCaCertificate(e.to_string()))?;

        Ok(Validator {
            ca_der,
            ca_not_before,
            ca_not_after,
            subject,
        })
    }
}

impl Validator {
    /// Create a validator trusting `ca_der` and enforcing `subject`.
    ///
    /// # Errors
    ///
    /// See [`ValidatorBuilder::build`].
    pub fn new(ca_der: impl Into<Vec<u8>>, subject: ExpectedSubject) -> Result<Self, ConfigError> {
        Self::builder()
            .ca_certificate_der(ca_der)
            .subject(subject)
            .build()
    }

    /// Start building a validator
    pub fn builder() -> ValidatorBuilder {
        ValidatorBuilder::default()
    }

    /// The enforced subject policy
    pub fn subject(&self) -> &ExpectedSubject {
        &self.subject
    }

    /// Validate an `x5c` chain (leaf first) and return the parsed leaf.
    ///
    /// # Errors
    ///
    /// - [`ValidatorError::X5cEmpty`] - empty chain
    /// - [`ValidatorError::InvalidCertEncoding`] / [`ValidatorError::ParseCertificateFailed`] - undecodable entry
    /// - [`ValidatorError::CaCertExpired`] / [`ValidatorError::PathValidation`] - the chain does not verify
    /// - [`ValidatorError::CommonNameMismatch`] / [`ValidatorError::OrganizationMismatch`] - policy violation
    pub fn validate(&self, x5c: &[String]) -> Result<Certificate, ValidatorError> {
        if x5c.is_empty() {
            return Err(ValidatorError::X5cEmpty);
        }

        let ders = x5c
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                STANDARD
                    .decode(entry)
                    .map_err(|source| ValidatorError::InvalidCertEncoding { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut certs = ders
            .iter()
            .enumerate()
            .map(|(index, der)| {
                Certificate::from_der(der)
                    .map_err(|source| ValidatorError::ParseCertificateFailed { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.verify_path(&ders)?;

        let leaf = certs.swap_remove(0);
        self.check_subject(&leaf)?;
        Ok(leaf)
    }

    fn verify_path(&self, ders: &[Vec<u8>]) -> Result<(), ValidatorError> {
        let now = UnixTime::now();
        let now_secs = now.as_secs();
        if now_secs < self.ca_not_before.as_secs() || now_secs > self.ca_not_after.as_secs() {
            return Err(ValidatorError::CaCertExpired);
        }

        let anchors = [webpki::anchor_from_trusted_cert(&self.ca_der)
            .map_err(ValidatorError::PathValidation)?];

        let leaf_der = CertificateDer::from(ders[0].as_slice());
        let intermediates: Vec<CertificateDer<'_>> = ders[1..]
            .iter()
            .map(|der| CertificateDer::from(der.as_slice()))
            .collect();

        let leaf = EndEntityCert::try_from(&leaf_der).map_err(ValidatorError::PathValidation)?;
        let verify = |usage: KeyUsage| {
            leaf.verify_for_usage(
                webpki::ALL_VERIFICATION_ALGS,
                &anchors,
                &intermediates,
                now,
                usage,
                None,
                None,
            )
            .map(|_| ())
        };

        // Leaves without an EKU extension pass either usage.
        verify(KeyUsage::client_auth())
            .or_else(|err| match err {
                webpki::Error::RequiredEkuNotFound => verify(KeyUsage::server_auth()),
                other => Err(other),
            })
            .map_err(|e| {
                debug!(error = %e, chain_len = ders.len(), "Certificate path validation failed");
                ValidatorError::PathValidation(e)
            })?;

        Ok(())
    }

    fn check_subject(&self, leaf: &Certificate) -> Result<(), ValidatorError> {
        let expected = &self.subject;

        let dns_names = dns_names(leaf)
            .map_err(|source| ValidatorError::ParseCertificateFailed { index: 0, source })?;
        let names = if dns_names.is_empty() {
            subject_attributes(leaf, COMMON_NAME)
        } else {
            dns_names
        };
        if !names.iter().any(|name| *name == expected.common_name) {
            return Err(ValidatorError::CommonNameMismatch {
                expected: expected.common_name.clone(),
                found: names,
            });
        }

        let organization = subject_attributes(leaf, ORGANIZATION).into_iter().next();
        if organization.as_deref() != Some(expected.organization.as_str()) {
            return Err(ValidatorError::OrganizationMismatch {
                expected: expected.organization.clone(),
                found: organization,
            });
        }

        Ok(())
    }
}

fn dns_names(cert: &Certificate) -> Result<Vec<String>, x509_cert::der::Error> {
    let names = match cert.tbs_certificate.get::<SubjectAltName>()? {
        Some((_critical, san)) => san
            .0
            .into_iter()
            .filter_map(|name| match name {
                GeneralName::DnsName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect(),
        None => Vec::new(),
    };
    Ok(names)
}

fn subject_attributes(cert: &Certificate, oid: ObjectIdentifier) -> Vec<String> {
    cert.tbs_certificate
        .subject
        .0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .filter(|atv| atv.oid == oid)
        .filter_map(|atv| directory_string(&atv.value))
        .collect()
}

fn directory_string(value: &Any) -> Option<String> {
    if let Ok(s) = Utf8StringRef::try_from(value) {
        return Some(s.as_str().to_owned());
    }
    if let Ok(s) = PrintableStringRef::try_from(value) {
        return Some(s.as_str().to_owned());
    }
    Ia5StringRef::try_from(value)
        .ok()
        .map(|s| s.as_str().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Eku, LeafSpec, TestPki, Validity, rsa_key_3072};

    fn validator(pki: &TestPki) -> Validator {
        Validator::new(pki.root_der(), ExpectedSubject::new("svc.example", "Acme")).unwrap()
    }

    #[test]
    fn test_builder_requires_ca() {
        let result = Validator::builder()
            .subject(ExpectedSubject::new("svc.example", "Acme"))
            .build();
        assert!(matches!(result, Err(ConfigError::CaCertNotLoaded)));
    }

    #[test]
    fn test_builder_requires_subject() {
        let pki = TestPki::new();
        let result = Validator::builder().ca_certificate_der(pki.root_der()).build();
        assert!(matches!(result, Err(ConfigError::UnknownSubject(_))));

        let result = Validator::new(pki.root_der(), ExpectedSubject::new("", "Acme"));
        assert!(matches!(result, Err(ConfigError::UnknownSubject("common name"))));

        let result = Validator::new(pki.root_der(), ExpectedSubject::new("svc.example", " "));
        assert!(matches!(result, Err(ConfigError::UnknownSubject("organization"))));
    }

    #[test]
    fn test_builder_rejects_garbage_ca() {
        let result = Validator::new(vec![1, 2, 3], ExpectedSubject::new("svc.example", "Acme"));
        assert!(matches!(result, Err(ConfigError::InvalidCaCertificate(_))));

        let result = Validator::builder()
            .ca_certificate_pem("-----BEGIN CERTIFICATE-----\nnope\n-----END CERTIFICATE-----\n")
            .subject(ExpectedSubject::new("svc.example", "Acme"))
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidCaCertificate(_))));
    }

    #[test]
    fn test_builder_accepts_pem() {
        let pki = TestPki::new();
        let validator = Validator::builder()
            .ca_certificate_pem(&pki.root_pem())
            .subject(ExpectedSubject::new("svc.example", "Acme"))
            .build()
            .unwrap();
        assert_eq!(validator.subject().organization, "Acme");
    }

    #[test]
    fn test_valid_chain_returns_leaf() {
        let pki = TestPki::new();
        let leaf = pki.leaf(LeafSpec::new("svc.example", "Acme", rsa_key_3072()));

        let cert = validator(&pki).validate(&leaf.x5c()).unwrap();
        assert_eq!(cert.to_der().unwrap(), leaf.der);
    }

    #[test]
    fn test_leaf_issued_by_root_needs_no_intermediate() {
        let pki = TestPki::new();
        let leaf = pki.leaf_from_root(LeafSpec::new("svc.example", "Acme", rsa_key_3072()));
        assert_eq!(leaf.x5c().len(), 1);

        let cert = validator(&pki).validate(&leaf.x5c()).unwrap();
        assert_eq!(cert.to_der().unwrap(), leaf.der);
    }

    #[test]
    fn test_empty_chain() {
        let pki = TestPki::new();
        assert!(matches!(
            validator(&pki).validate(&[]),
            Err(ValidatorError::X5cEmpty)
        ));
    }

    #[test]
    fn test_bad_base64_and_bad_der() {
        let pki = TestPki::new();
        let leaf = pki.leaf(LeafSpec::new("svc.example", "Acme", rsa_key_3072()));

        let mut chain = leaf.x5c();
        chain[1] = "!!not base64!!".to_string();
        assert!(matches!(
            validator(&pki).validate(&chain),
            Err(ValidatorError::InvalidCertEncoding { index: 1, .. })
        ));

        let chain = vec![STANDARD.encode(b"definitely not DER")];
        assert!(matches!(
            validator(&pki).validate(&chain),
            Err(ValidatorError::ParseCertificateFailed { index: 0, .. })
        ));
    }

    #[test]
    fn test_missing_intermediate_is_unknown_authority() {
        let pki = TestPki::new();
        let leaf = pki.leaf(LeafSpec::new("svc.example", "Acme", rsa_key_3072()));

        let err = validator(&pki)
            .validate(&leaf.x5c_without_intermediate())
            .unwrap_err();
        assert!(err.is_unknown_authority(), "{err:?}");
    }

    #[test]
    fn test_foreign_ca_is_unknown_authority() {
        let pki = TestPki::new();
        let other = TestPki::new();
        let leaf = other.leaf(LeafSpec::new("svc.example", "Acme", rsa_key_3072()));

        let err = validator(&pki).validate(&leaf.x5c()).unwrap_err();
        assert!(err.is_unknown_authority(), "{err:?}");
    }

    #[test]
    fn test_expired_leaf() {
        let pki = TestPki::new();
        let leaf = pki.leaf(
            LeafSpec::new("svc.example", "Acme", rsa_key_3072()).validity(Validity::Expired),
        );
        let err = validator(&pki).validate(&leaf.x5c()).unwrap_err();
        assert!(err.is_expired(), "{err:?}");
    }

    #[test]
    fn test_not_yet_valid_leaf() {
        let pki = TestPki::new();
        let leaf = pki.leaf(
            LeafSpec::new("svc.example", "Acme", rsa_key_3072()).validity(Validity::NotYetValid),
        );
        let err = validator(&pki).validate(&leaf.x5c()).unwrap_err();
        assert!(err.is_expired(), "{err:?}");
    }

    #[test]
    fn test_expired_intermediate() {
        let pki = TestPki::with_validity(Validity::Current, Validity::Expired);
        let leaf = pki.leaf(LeafSpec::new("svc.example", "Acme", rsa_key_3072()));
        let err = validator(&pki).validate(&leaf.x5c()).unwrap_err();
        assert!(err.is_expired(), "{err:?}");
    }

    #[test]
    fn test_expired_root() {
        let pki = TestPki::with_validity(Validity::Expired, Validity::Current);
        let leaf = pki.leaf(LeafSpec::new("svc.example", "Acme", rsa_key_3072()));
        let err = validator(&pki).validate(&leaf.x5c()).unwrap_err();
        assert!(matches!(err, ValidatorError::CaCertExpired));
        assert!(err.is_expired());
    }

    #[test]
    fn test_common_name_without_sans() {
        let pki = TestPki::new();
        let leaf = pki.leaf(LeafSpec::new("svc.example", "Acme", rsa_key_3072()));
        assert!(validator(&pki).validate(&leaf.x5c()).is_ok());

        let leaf = pki.leaf(LeafSpec::new("other.example", "Acme", rsa_key_3072()));
        let err = validator(&pki).validate(&leaf.x5c()).unwrap_err();
        assert!(matches!(
            err,
            ValidatorError::CommonNameMismatch { ref found, .. } if found == &["other.example"]
        ));
    }

    #[test]
    fn test_dns_san_match() {
        let pki = TestPki::new();
        let leaf = pki.leaf(
            LeafSpec::new("unrelated-cn", "Acme", rsa_key_3072())
                .dns_names(["api.example", "svc.example"]),
        );
        assert!(validator(&pki).validate(&leaf.x5c()).is_ok());
    }

    #[test]
    fn test_sans_present_but_missing_name_does_not_fall_back_to_cn() {
        let pki = TestPki::new();
        let leaf = pki.leaf(
            LeafSpec::new("svc.example", "Acme", rsa_key_3072()).dns_names(["api.example"]),
        );
        let err = validator(&pki).validate(&leaf.x5c()).unwrap_err();
        assert!(matches!(err, ValidatorError::CommonNameMismatch { .. }));
        assert!(err.is_policy_violation());
    }

    #[test]
    fn test_organization_mismatch() {
        let pki = TestPki::new();
        let leaf = pki.leaf(LeafSpec::new("svc.example", "Globex", rsa_key_3072()));
        let err = validator(&pki).validate(&leaf.x5c()).unwrap_err();
        assert!(matches!(
            err,
            ValidatorError::OrganizationMismatch { found: Some(ref org), .. } if org == "Globex"
        ));
    }

    #[test]
    fn test_missing_organization() {
        let pki = TestPki::new();
        let leaf = pki.leaf(
            LeafSpec::new("svc.example", "Acme", rsa_key_3072()).without_organization(),
        );
        let err = validator(&pki).validate(&leaf.x5c()).unwrap_err();
        assert!(matches!(
            err,
            ValidatorError::OrganizationMismatch { found: None, .. }
        ));
    }

    #[test]
    fn test_server_auth_only_leaf() {
        let pki = TestPki::new();
        let leaf = pki.leaf(
            LeafSpec::new("svc.example", "Acme", rsa_key_3072())
                .extended_key_usages([Eku::ServerAuth]),
        );
        assert!(validator(&pki).validate(&leaf.x5c()).is_ok());
    }

    #[test]
    fn test_client_auth_only_leaf() {
        let pki = TestPki::new();
        let leaf = pki.leaf(
            LeafSpec::new("svc.example", "Acme", rsa_key_3072())
                .extended_key_usages([Eku::ClientAuth]),
        );
        assert!(validator(&pki).validate(&leaf.x5c()).is_ok());
    }

    #[test]
    fn test_leaf_without_tls_usage_is_rejected() {
        let pki = TestPki::new();
        let leaf = pki.leaf(
            LeafSpec::new("svc.example", "Acme", rsa_key_3072())
                .extended_key_usages([Eku::CodeSigning]),
        );
        let err = validator(&pki).validate(&leaf.x5c()).unwrap_err();
        assert!(matches!(
            err,
            ValidatorError::PathValidation(webpki::Error::RequiredEkuNotFound)
        ));
    }

    #[test]
    fn test_malformed_san_is_a_parse_error() {
        let pki = TestPki::new();
        // SEQUENCE claiming 3 bytes with only 2 present
        let leaf = pki.leaf(
            LeafSpec::new("svc.example", "Acme", rsa_key_3072())
                .custom_extension(&[2, 5, 29, 17], vec![0x30, 0x03, 0x82, 0x01]),
        );
        let cert = leaf.certificate();

        let err = validator(&pki).check_subject(&cert).unwrap_err();
        assert!(matches!(
            err,
            ValidatorError::ParseCertificateFailed { index: 0, .. }
        ));
        assert!(!err.is_policy_violation());
    }
}
