//! JWKS (JSON Web Key Set) document model
//!
//! Keys in this format carry their full X.509 chain in `x5c` (leaf first,
//! standard base64 DER). The advertised `n` / `e` members are informational:
//! verification keys are always derived from the leaf certificate after the
//! chain has been validated.
//!
//! ```json
//! {"keys":[{"kty":"RSA","alg":"PS256","use":"sig","key_ops":["verify"],
//!           "kid":"k1","x5c":["MIIE..."],"n":"2519...","e":"65537"}]}
//! ```

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rsa::RsaPublicKey;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use x509_cert::Certificate;
use x509_cert::der::referenced::OwnedToRef as _;
use x509_cert::der::{Decode as _, Encode as _};

use crate::error::JwksError;

/// Key type of a JWK entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// RSA (the only type that can be published)
    Rsa,
    /// Elliptic curve
    Ec,
    /// Octet sequence (symmetric)
    Oct,
}

impl KeyType {
    /// The `kty` member value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rsa => "RSA",
            Self::Ec => "EC",
            Self::Oct => "oct",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One JWK entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Key {
    /// Key type (`RSA`)
    pub kty: String,
    /// Intended algorithm (`PS256`)
    pub alg: String,
    /// Declared use (`sig`)
    #[serde(rename = "use")]
    pub key_use: String,
    /// Permitted operations
    pub key_ops: Vec<String>,
    /// Key id, unique within a document by convention
    pub kid: String,
    /// Certificate chain, leaf first, standard base64 DER
    pub x5c: Vec<String>,
    /// RSA modulus as a decimal string
    pub n: String,
    /// RSA public exponent as a decimal string
    pub e: String,
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

impl Key {
    /// Structural validation: every scalar member non-blank, `key_ops` and
    /// `x5c` non-empty without blank entries.
    ///
    /// # Errors
    ///
    /// [`JwksError::BlankField`] or [`JwksError::InvalidList`] naming the
    /// first offending member.
    pub fn validate(&self) -> Result<(), JwksError> {
        let scalars = [
            ("kty", &self.kty),
            ("alg", &self.alg),
            ("use", &self.key_use),
            ("kid", &self.kid),
            ("n", &self.n),
            ("e", &self.e),
        ];
        if let Some((field, _)) = scalars.into_iter().find(|(_, value)| is_blank(value)) {
            return Err(JwksError::BlankField {
                kid: self.kid.clone(),
                field,
            });
        }

        let lists = [("key_ops", &self.key_ops), ("x5c", &self.x5c)];
        for (field, values) in lists {
            if values.is_empty() || values.iter().any(|v| is_blank(v)) {
                return Err(JwksError::InvalidList {
                    kid: self.kid.clone(),
                    field,
                });
            }
        }

        Ok(())
    }

    /// Decode the leaf (first) certificate of the chain without validating it.
    ///
    /// # Errors
    ///
    /// [`JwksError::CertificateNotFound`] for an empty chain, otherwise the
    /// base64 or DER decoding error.
    pub fn leaf_certificate(&self) -> Result<Certificate, JwksError> {
        let leaf = self.x5c.first().ok_or(JwksError::CertificateNotFound)?;
        let der = STANDARD.decode(leaf)?;
        Ok(Certificate::from_der(&der)?)
    }
}

/// Extract the RSA public key a certificate was issued for.
///
/// # Errors
///
/// [`JwksError::RsaPublicKeyNotFound`] if the subject public key is not RSA.
pub fn rsa_public_key(cert: &Certificate) -> Result<RsaPublicKey, JwksError> {
    let spki = cert.tbs_certificate.subject_public_key_info.owned_to_ref();
    RsaPublicKey::try_from(spki).map_err(|_| JwksError::RsaPublicKeyNotFound)
}

/// Write-side description of one key to publish
#[derive(Debug, Clone)]
pub struct Input {
    /// Key id
    pub kid: String,
    /// Key type
    pub kty: KeyType,
    /// Intended algorithm
    pub alg: String,
    /// Declared use
    pub key_use: String,
    /// Permitted operations
    pub key_ops: Vec<String>,
    /// Certificate chain, leaf first
    pub certificates: Vec<Certificate>,
}

impl Input {
    /// A PS256 signature-verification key backed by `certificates`.
    pub fn rsa(kid: impl Into<String>, certificates: Vec<Certificate>) -> Self {
        Self {
            kid: kid.into(),
            kty: KeyType::Rsa,
            alg: crate::SIGNING_ALGORITHM.to_string(),
            key_use: "sig".to_string(),
            key_ops: vec!["verify".to_string()],
            certificates,
        }
    }
}

/// An ordered set of keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Jwks {
    /// Keys in document order
    #[serde(default)]
    pub keys: Vec<Key>,
}

impl Jwks {
    /// An empty key set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a key set from certificates.
    ///
    /// Each input's certificates are encoded into `x5c` in the given order;
    /// for RSA inputs the first certificate supplies `n` and `e`.
    ///
    /// # Errors
    ///
    /// - [`JwksError::CertificateNotFound`] - an input has no certificate
    /// - [`JwksError::DuplicateKid`] - two inputs share a key id
    /// - [`JwksError::RsaPublicKeyNotFound`] - an RSA input's leaf holds another key type
    /// - [`JwksError::KeyTypeUnsupported`] - a non-RSA input
    pub fn build(inputs: impl IntoIterator<Item = Input>) -> Result<Self, JwksError> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();

        for input in inputs {
            let leaf = input
                .certificates
                .first()
                .ok_or(JwksError::CertificateNotFound)?;

            if !seen.insert(input.kid.clone()) {
                return Err(JwksError::DuplicateKid(input.kid));
            }

            let public_key = match input.kty {
                KeyType::Rsa => rsa_public_key(leaf)?,
                other => return Err(JwksError::KeyTypeUnsupported(other.to_string())),
            };

            let x5c = input
                .certificates
                .iter()
                .map(|cert| cert.to_der().map(|der| STANDARD.encode(der)))
                .collect::<Result<Vec<_>, _>>()?;

            keys.push(Key {
                kty: input.kty.to_string(),
                alg: input.alg,
                key_use: input.key_use,
                key_ops: input.key_ops,
                kid: input.kid,
                x5c,
                n: public_key.n().to_string(),
                e: public_key.e().to_string(),
            });
        }

        Ok(Self { keys })
    }

    /// Decode a key set from JSON bytes.
    ///
    /// # Errors
    ///
    /// Same as [`Jwks::decode`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self, JwksError> {
        let mut jwks = Self::new();
        jwks.decode(bytes)?;
        Ok(jwks)
    }

    /// Load a key set from a JSON file.
    ///
    /// # Errors
    ///
    /// I/O errors opening the file, plus everything [`Jwks::decode`] rejects.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, JwksError> {
        let file = File::open(path)?;
        let mut jwks = Self::new();
        jwks.decode(BufReader::new(file))?;
        Ok(jwks)
    }

    /// Write the key set to a JSON file, replacing it.
    ///
    /// # Errors
    ///
    /// I/O or serialization failures.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), JwksError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Serialize as `{"keys":[...]}`.
    ///
    /// # Errors
    ///
    /// Serialization or writer failures.
    pub fn encode<W: Write>(&self, writer: W) -> Result<(), JwksError> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// Replace this key set with one decoded from `reader`.
    ///
    /// Decoding is transactional: the document is parsed and every key
    /// validated before `self` is touched, so on error the previous keys
    /// remain in place.
    ///
    /// # Errors
    ///
    /// - [`JwksError::Json`] - malformed JSON
    /// - [`JwksError::CertificateNotFound`] - the document has no keys
    /// - [`JwksError::BlankField`] / [`JwksError::InvalidList`] - a key fails [`Key::validate`]
    pub fn decode<R: Read>(&mut self, reader: R) -> Result<(), JwksError> {
        let decoded: Jwks = serde_json::from_reader(reader)?;
        if decoded.keys.is_empty() {
            return Err(JwksError::CertificateNotFound);
        }
        decoded.keys.iter().try_for_each(Key::validate)?;

        *self = decoded;
        Ok(())
    }

    /// First key with the given id
    pub fn find(&self, kid: &str) -> Option<&Key> {
        self.keys.iter().find(|key| key.kid == kid)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
