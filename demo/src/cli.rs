//! Command-line arguments

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// svctrust operator CLI
#[derive(Parser, Debug)]
#[command(
    name = "svctrust-demo",
    version,
    about = "Build and check X.509-backed JWKS documents, sign and verify messages"
)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a JWKS file from PEM certificate chains
    BuildJwks(BuildJwksArgs),

    /// Validate every key of a JWKS document against a CA and subject
    CheckJwks(CheckJwksArgs),

    /// Sign a message body and print the token
    Sign(SignArgs),

    /// Verify a token against a message body using a trust configuration
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
pub struct BuildJwksArgs {
    /// Key entry as `KID=CHAIN.pem`, the PEM holding the leaf first
    #[arg(long = "key", value_name = "KID=PEM", required = true, value_parser = parse_key_entry)]
    pub keys: Vec<(String, PathBuf)>,

    /// Output file
    #[arg(long, short = 'o')]
    pub out: PathBuf,
}

#[derive(Args, Debug)]
pub struct CheckJwksArgs {
    /// JWKS file to check
    #[arg(long, conflicts_with = "url", required_unless_present = "url")]
    pub file: Option<PathBuf>,

    /// JWKS endpoint to fetch and check
    #[arg(long)]
    pub url: Option<String>,

    /// CA certificate (PEM) the chains must lead to
    #[arg(long)]
    pub ca: PathBuf,

    /// Expected common name (or DNS name)
    #[arg(long)]
    pub common_name: String,

    /// Expected organization
    #[arg(long)]
    pub organization: String,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    /// RSA private key, PKCS#8 or PKCS#1 PEM
    #[arg(long)]
    pub key: PathBuf,

    /// Issuer to sign as
    #[arg(long)]
    pub iss: String,

    /// Key id to sign as
    #[arg(long)]
    pub kid: String,

    /// Message body file
    #[arg(long)]
    pub body: PathBuf,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Trust configuration (JSON)
    #[arg(long, env = "SVCTRUST_CONFIG")]
    pub config: PathBuf,

    /// Token to verify
    #[arg(long)]
    pub token: String,

    /// Message body file
    #[arg(long)]
    pub body: PathBuf,
}

fn parse_key_entry(raw: &str) -> Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((kid, path)) if !kid.trim().is_empty() && !path.is_empty() => {
            Ok((kid.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected KID=PEM, got {raw:?}")),
    }
}
