//! Test fixtures: throwaway PKI hierarchies, RSA keys and key providers
//!
//! Roots and intermediates use ECDSA P-256 keys so fixtures are cheap; leaf
//! certificates carry the RSA keys that end up in JWKS documents. RSA keys are
//! generated once per process and cloned out.

#![allow(clippy::expect_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DistinguishedName, DnType,
    IsCa, KeyPair, KeyUsagePurpose,
};
use rsa::pkcs8::{EncodePrivateKey as _, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use time::{Duration, OffsetDateTime};
use x509_cert::Certificate;
use x509_cert::der::Decode as _;

pub use rcgen::ExtendedKeyUsagePurpose as Eku;

use crate::error::BoxError;
use crate::jwks::{Input, Jwks};
use crate::signer::{KeyMetadata, PrivateKeyProvider};
use crate::verifier::PublicKeyProvider;

static RSA_3072: LazyLock<RsaPrivateKey> = LazyLock::new(|| generate_rsa(3072));
static RSA_3072_ALT: LazyLock<RsaPrivateKey> = LazyLock::new(|| generate_rsa(3072));
static RSA_2048: LazyLock<RsaPrivateKey> = LazyLock::new(|| generate_rsa(2048));

static NEXT_PKI: AtomicUsize = AtomicUsize::new(0);

fn generate_rsa(bits: usize) -> RsaPrivateKey {
    RsaPrivateKey::new(&mut rand::thread_rng(), bits).expect("RSA key generation")
}

/// Shared 3072-bit RSA key
pub fn rsa_key_3072() -> RsaPrivateKey {
    RSA_3072.clone()
}

/// A second, different 3072-bit RSA key
pub fn rsa_key_3072_alt() -> RsaPrivateKey {
    RSA_3072_ALT.clone()
}

/// Shared 2048-bit RSA key (below the signing minimum)
pub fn rsa_key_2048() -> RsaPrivateKey {
    RSA_2048.clone()
}

/// Validity window of a fixture certificate, relative to now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validity {
    /// Valid from yesterday for a year
    #[default]
    Current,
    /// Expired yesterday
    Expired,
    /// Valid from tomorrow
    NotYetValid,
}

impl Validity {
    fn apply(self, params: &mut CertificateParams) {
        let now = OffsetDateTime::now_utc();
        let (not_before, not_after) = match self {
            Self::Current => (now - Duration::days(1), now + Duration::days(365)),
            Self::Expired => (now - Duration::days(30), now - Duration::days(1)),
            Self::NotYetValid => (now + Duration::days(1), now + Duration::days(30)),
        };
        params.not_before = not_before;
        params.not_after = not_after;
    }
}

struct Authority {
    cert: rcgen::Certificate,
    key: KeyPair,
}

fn ca_params(common_name: &str, validity: Validity) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("CA params");
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn.push(DnType::OrganizationName, "svctrust tests");
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    validity.apply(&mut params);
    params
}

/// Root CA plus one intermediate
pub struct TestPki {
    root: Authority,
    intermediate: Authority,
}

impl Default for TestPki {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPki {
    /// A currently valid root and intermediate
    pub fn new() -> Self {
        Self::with_validity(Validity::Current, Validity::Current)
    }

    /// Root and intermediate with the given validity windows
    pub fn with_validity(root: Validity, intermediate: Validity) -> Self {
        // unique names so two fixtures never look like the same authority
        let id = NEXT_PKI.fetch_add(1, Ordering::Relaxed);

        let root_key = KeyPair::generate().expect("root key");
        let root_cert = ca_params(&format!("svctrust test root {id}"), root)
            .self_signed(&root_key)
            .expect("root certificate");

        let intermediate_key = KeyPair::generate().expect("intermediate key");
        let intermediate_cert =
            ca_params(&format!("svctrust test intermediate {id}"), intermediate)
                .signed_by(&intermediate_key, &root_cert, &root_key)
                .expect("intermediate certificate");

        Self {
            root: Authority {
                cert: root_cert,
                key: root_key,
            },
            intermediate: Authority {
                cert: intermediate_cert,
                key: intermediate_key,
            },
        }
    }

    /// Root certificate, DER
    pub fn root_der(&self) -> Vec<u8> {
        self.root.cert.der().to_vec()
    }

    /// Root certificate, PEM
    pub fn root_pem(&self) -> String {
        self.root.cert.pem()
    }

    /// Intermediate certificate, DER
    pub fn intermediate_der(&self) -> Vec<u8> {
        self.intermediate.cert.der().to_vec()
    }

    /// Intermediate certificate, parsed
    pub fn intermediate_certificate(&self) -> Certificate {
        Certificate::from_der(&self.intermediate_der()).expect("intermediate parses")
    }

    /// Issue a leaf certificate from the intermediate
    pub fn leaf(&self, wanted: LeafSpec) -> Leaf {
        self.issue(wanted, &self.intermediate, Some(self.intermediate_der()))
    }

    /// Issue a leaf certificate directly from the root
    pub fn leaf_from_root(&self, wanted: LeafSpec) -> Leaf {
        self.issue(wanted, &self.root, None)
    }

    fn issue(&self, wanted: LeafSpec, issuer: &Authority, intermediate: Option<Vec<u8>>) -> Leaf {
        let pem = wanted
            .key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("PKCS#8 export");
        let subject_key = KeyPair::from_pem(&pem).expect("rcgen accepts RSA key");

        let mut params = CertificateParams::new(wanted.dns_names).expect("leaf params");
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, wanted.common_name);
        if let Some(org) = wanted.organization {
            dn.push(DnType::OrganizationName, org);
        }
        params.distinguished_name = dn;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = wanted.extended_key_usages;
        params.custom_extensions = wanted.custom_extensions;
        wanted.validity.apply(&mut params);

        let cert = params
            .signed_by(&subject_key, &issuer.cert, &issuer.key)
            .expect("leaf certificate");

        Leaf {
            der: cert.der().to_vec(),
            key: wanted.key,
            intermediate,
        }
    }
}

/// What to put in a leaf certificate
#[derive(Debug, Clone)]
pub struct LeafSpec {
    common_name: String,
    organization: Option<String>,
    dns_names: Vec<String>,
    extended_key_usages: Vec<Eku>,
    custom_extensions: Vec<CustomExtension>,
    validity: Validity,
    key: RsaPrivateKey,
}

impl LeafSpec {
    /// Leaf with the given CN and Organization, no SANs, currently valid
    pub fn new(
        common_name: impl Into<String>,
        organization: impl Into<String>,
        key: RsaPrivateKey,
    ) -> Self {
        Self {
            common_name: common_name.into(),
            organization: Some(organization.into()),
            dns_names: Vec::new(),
            extended_key_usages: Vec::new(),
            custom_extensions: Vec::new(),
            validity: Validity::Current,
            key,
        }
    }

    /// Add DNS subject alternative names
    pub fn dns_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the extended key usages (none by default)
    pub fn extended_key_usages<I>(mut self, usages: I) -> Self
    where
        I: IntoIterator<Item = Eku>,
    {
        self.extended_key_usages = usages.into_iter().collect();
        self
    }

    /// Add a raw extension, content as given
    pub fn custom_extension(mut self, oid: &[u64], content: Vec<u8>) -> Self {
        self.custom_extensions
            .push(CustomExtension::from_oid_content(oid, content));
        self
    }

    /// Drop the Organization attribute
    pub fn without_organization(mut self) -> Self {
        self.organization = None;
        self
    }

    /// Set the validity window
    pub fn validity(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }
}

/// An issued leaf certificate and its private key
#[derive(Debug, Clone)]
pub struct Leaf {
    /// Leaf certificate, DER
    pub der: Vec<u8>,
    /// Private key matching the certificate
    pub key: RsaPrivateKey,
    intermediate: Option<Vec<u8>>,
}

impl Leaf {
    /// Leaf certificate, parsed
    pub fn certificate(&self) -> Certificate {
        Certificate::from_der(&self.der).expect("leaf parses")
    }

    /// `x5c` chain: leaf then intermediate (if any)
    pub fn x5c(&self) -> Vec<String> {
        std::iter::once(&self.der)
            .chain(self.intermediate.as_ref())
            .map(|der| STANDARD.encode(der))
            .collect()
    }

    /// `x5c` chain with only the leaf
    pub fn x5c_without_intermediate(&self) -> Vec<String> {
        vec![STANDARD.encode(&self.der)]
    }

    /// Public half of the leaf key
    pub fn public_key(&self) -> RsaPublicKey {
        self.key.to_public_key()
    }

    /// Single-key JWKS publishing this leaf (and its intermediate) under `kid`
    pub fn jwks(&self, kid: &str) -> Jwks {
        let mut certificates = vec![self.certificate()];
        if let Some(der) = &self.intermediate {
            certificates.push(Certificate::from_der(der).expect("intermediate parses"));
        }
        Jwks::build([Input::rsa(kid, certificates)]).expect("fixture JWKS builds")
    }
}

/// Private key provider that always hands out the same key
#[derive(Debug, Clone)]
pub struct StaticKeyProvider {
    key: RsaPrivateKey,
    metadata: KeyMetadata,
}

impl StaticKeyProvider {
    /// Serve `key` as `(iss, kid)`
    pub fn new(key: RsaPrivateKey, iss: &str, kid: &str) -> Self {
        Self {
            key,
            metadata: KeyMetadata::new(iss, kid),
        }
    }
}

#[async_trait]
impl PrivateKeyProvider for StaticKeyProvider {
    async fn current_signing_key(&self) -> Result<(RsaPrivateKey, KeyMetadata), BoxError> {
        Ok((self.key.clone(), self.metadata.clone()))
    }
}

/// Public key provider backed by a fixed map
#[derive(Debug, Clone, Default)]
pub struct StaticPublicKeys {
    keys: HashMap<(String, String), RsaPublicKey>,
}

impl StaticPublicKeys {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` for `(iss, kid)`
    pub fn with_key(mut self, iss: &str, kid: &str, key: RsaPublicKey) -> Self {
        self.keys.insert((iss.to_string(), kid.to_string()), key);
        self
    }
}

#[async_trait]
impl PublicKeyProvider for StaticPublicKeys {
    async fn verification_key(&self, issuer: &str, kid: &str) -> Result<RsaPublicKey, BoxError> {
        self.keys
            .get(&(issuer.to_string(), kid.to_string()))
            .cloned()
            .ok_or_else(|| format!("no key for {issuer}/{kid}").into())
    }
}
