//! Subcommand implementations

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey as _;
use rsa::pkcs8::DecodePrivateKey as _;
use svctrust::{
    BoxError, Client, ExpectedSubject, Input, Jwks, KeyMetadata, PrivateKeyProvider, Signer,
    TrustConfig, Validator, VerificationKeyProvider, Verifier,
};
use tracing::{debug, info};
use x509_cert::Certificate;

use crate::cli::{BuildJwksArgs, CheckJwksArgs, SignArgs, VerifyArgs};

/// Signing key read once from a PEM file
struct PemKeyProvider {
    key: RsaPrivateKey,
    metadata: KeyMetadata,
}

impl PemKeyProvider {
    fn load(path: &Path, metadata: KeyMetadata) -> Result<Self> {
        let pem = std::fs::read_to_string(path)
            .with_context(|| format!("reading private key {}", path.display()))?;
        let key = RsaPrivateKey::from_pkcs8_pem(&pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
            .with_context(|| format!("{} is not an RSA private key", path.display()))?;
        Ok(Self { key, metadata })
    }
}

#[async_trait]
impl PrivateKeyProvider for PemKeyProvider {
    async fn current_signing_key(&self) -> Result<(RsaPrivateKey, KeyMetadata), BoxError> {
        Ok((self.key.clone(), self.metadata.clone()))
    }
}

fn read_chain(path: &Path) -> Result<Vec<Certificate>> {
    let pem = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    // load_pem_chain panics on empty input
    if pem.trim_ascii().is_empty() {
        bail!("{} contains no certificates", path.display());
    }
    let chain = Certificate::load_pem_chain(&pem)
        .with_context(|| format!("{} is not a PEM certificate chain", path.display()))?;
    if chain.is_empty() {
        bail!("{} contains no certificates", path.display());
    }
    Ok(chain)
}

pub fn build_jwks(args: BuildJwksArgs) -> Result<Jwks> {
    let inputs = args
        .keys
        .iter()
        .map(|(kid, path)| Ok(Input::rsa(kid.clone(), read_chain(path)?)))
        .collect::<Result<Vec<_>>>()?;

    let jwks = Jwks::build(inputs).context("building JWKS")?;
    jwks.save(&args.out)
        .with_context(|| format!("writing {}", args.out.display()))?;

    info!(keys = jwks.len(), out = %args.out.display(), "Wrote JWKS");
    Ok(jwks)
}

/// One line of `check-jwks` output
#[derive(Debug)]
pub struct KeyReport {
    pub kid: String,
    pub problem: Option<String>,
}

pub async fn check_jwks(args: CheckJwksArgs) -> Result<Vec<KeyReport>> {
    let jwks = match (&args.file, &args.url) {
        (Some(file), _) => {
            Jwks::load(file).with_context(|| format!("loading {}", file.display()))?
        }
        (None, Some(url)) => Client::new(url)?.get().await?,
        (None, None) => bail!("either --file or --url is required"),
    };

    let ca_pem = std::fs::read_to_string(&args.ca)
        .with_context(|| format!("reading CA {}", args.ca.display()))?;
    let validator = Validator::builder()
        .ca_certificate_pem(&ca_pem)
        .subject(ExpectedSubject::new(args.common_name, args.organization))
        .build()?;

    let reports = jwks
        .keys
        .iter()
        .map(|key| {
            let problem = match validator.validate(&key.x5c) {
                Ok(leaf) => svctrust::jwks::rsa_public_key(&leaf)
                    .err()
                    .map(|e| e.to_string()),
                Err(e) => Some(e.to_string()),
            };
            debug!(kid = %key.kid, ok = problem.is_none(), "Checked key");
            KeyReport {
                kid: key.kid.clone(),
                problem,
            }
        })
        .collect();

    Ok(reports)
}

pub async fn sign(args: SignArgs) -> Result<String> {
    let provider = PemKeyProvider::load(&args.key, KeyMetadata::new(args.iss, args.kid))?;
    let body =
        std::fs::read(&args.body).with_context(|| format!("reading {}", args.body.display()))?;

    let signer = Signer::new(Arc::new(provider));
    Ok(signer.sign(&body).await?)
}

pub async fn verify(args: VerifyArgs) -> Result<()> {
    let config = TrustConfig::from_json_file(&args.config)?;
    let provider = VerificationKeyProvider::from_config(&config)?;
    let verifier = Verifier::builder()
        .key_provider(Arc::new(provider))
        .trusted_issuers(config.issuer_names())
        .build()?;

    let body =
        std::fs::read(&args.body).with_context(|| format!("reading {}", args.body.display()))?;
    verifier.verify(args.token.trim(), &body).await?;
    Ok(())
}
