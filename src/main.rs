use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use mimir::config::ResolverConfig;
use mimir::dns::enums::RecordType;
use mimir::resolver::{QueryControls, Resolver};

/// One-shot lookup tool driving the iterative resolver.
#[derive(Parser, Debug)]
#[command(name = "mimir", version, about = "Iterative, DNSSEC-validating DNS resolver")]
struct Args {
    /// Domain name to resolve
    name: String,

    /// Record type to query
    #[arg(default_value = "A")]
    rtype: String,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not request DNSSEC records (clears the DO bit)
    #[arg(long)]
    no_dnssec: bool,

    /// Never query name servers over IPv6
    #[arg(long)]
    no_v6: bool,

    /// Overall query budget in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();

    let qtype = match RecordType::from_mnemonic(&args.rtype) {
        Some(qtype) => qtype,
        None => {
            error!("unknown record type {:?}", args.rtype);
            return ExitCode::FAILURE;
        }
    };

    let config = match &args.config {
        Some(path) => ResolverConfig::load(path),
        None => ResolverConfig::from_env(),
    };
    let mut config = match config {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };
    if args.no_v6 {
        config.disable_v6_ns = true;
    }

    let resolver = match Resolver::new(config) {
        Ok(resolver) => resolver,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let controls = QueryControls {
        dnssec_ok: if args.no_dnssec { Some(false) } else { None },
        deadline: Some(Duration::from_secs(args.timeout)),
        ..QueryControls::default()
    };

    match resolver.resolve_with(&args.name, qtype, controls).await {
        Ok(reply) => {
            println!(
                ";; status: {}, zone: {}, ad: {}, transport: {:?}",
                reply.message.rcode(),
                reply.zone,
                reply.message.header.ad,
                reply.transport
            );
            for rr in &reply.message.answers {
                println!("{rr}");
            }
            if reply.message.answers.is_empty() {
                for rr in &reply.message.authorities {
                    println!("{rr}");
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("resolution failed: {err} (rcode {})", err.rcode());
            ExitCode::FAILURE
        }
    }
}
