//! svctrust operator CLI
//!
//! ```bash
//! # publish a key
//! svctrust-demo build-jwks --key k1=certs/issuer-chain.pem -o jwks.json
//!
//! # check what an issuer publishes
//! svctrust-demo check-jwks --url https://issuer.example/.well-known/jwks.json \
//!   --ca ca.pem --common-name issuer.example --organization Acme
//!
//! # local round trip
//! TOKEN=$(svctrust-demo sign --key key.pem --iss https://issuer.example --kid k1 --body msg.json)
//! svctrust-demo verify --config trust.json --token "$TOKEN" --body msg.json
//! ```

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::BuildJwks(args) => {
            let jwks = commands::build_jwks(args)?;
            println!("wrote {} key(s)", jwks.len());
        }
        Commands::CheckJwks(args) => {
            let reports = commands::check_jwks(args).await?;
            let rejected = reports.iter().filter(|r| r.problem.is_some()).count();
            for report in &reports {
                match &report.problem {
                    None => println!("{}: ok", report.kid),
                    Some(problem) => println!("{}: rejected: {problem}", report.kid),
                }
            }
            if rejected > 0 {
                anyhow::bail!("{rejected} of {} key(s) rejected", reports.len());
            }
        }
        Commands::Sign(args) => {
            println!("{}", commands::sign(args).await?);
        }
        Commands::Verify(args) => {
            commands::verify(args).await?;
            println!("ok");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
