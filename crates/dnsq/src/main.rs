use clap::Parser;
use std::net::IpAddr;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use dns_resolver::host::HostRecords;
use dns_resolver::metrics::Metrics;
use dns_resolver::transport::{UdpTransport, DNS_PORT};
use dns_resolver::{Resolver, ResolverConfig};
use dns_types::protocol::types::DomainName;

/// The lines `host` would print, in the order it would print them.
fn format_records(records: &HostRecords) -> Vec<String> {
    let mut lines = Vec::new();

    for cname in &records.cnames {
        lines.push(format!("{} is an alias for {}", cname.alias, cname.name));
    }
    for a in &records.a {
        lines.push(format!("{} has address {}", a.name, a.address));
    }
    for aaaa in &records.aaaa {
        lines.push(format!("{} has IPv6 address {}", aaaa.name, aaaa.address));
    }
    for mx in &records.mx {
        lines.push(format!(
            "{} mail is handled by {} {}",
            mx.name, mx.preference, mx.exchange
        ));
    }

    lines
}

fn begin_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// the doc comments for this struct turn into the CLI help text
#[derive(Parser)]
/// DNS lookup utility
///
/// Resolves each name by walking down from the root nameservers, and
/// prints its aliases, addresses, and mail exchanges in the style of
/// `host`.
///
/// It does not query nameservers over IPv6, or fall back to TCP.
struct Args {
    /// Domain names to resolve
    #[clap(required = true, value_parser)]
    names: Vec<DomainName>,

    /// Print timings, and log each resolution step to stderr
    #[clap(short, long, action(clap::ArgAction::SetTrue))]
    verbose: bool,

    /// Seconds to wait for a reply from each nameserver
    #[clap(long, default_value_t = 3.0, env = "DNSQ_TIMEOUT", value_parser)]
    timeout: f64,

    /// Root nameserver to start from, can be specified more than once
    /// (replaces the built-in list)
    #[clap(
        long = "root-hint",
        env = "DNSQ_ROOT_HINTS",
        value_delimiter = ',',
        value_parser
    )]
    root_hints: Vec<IpAddr>,

    /// Port to send queries to
    #[clap(long, default_value_t = DNS_PORT, env = "DNSQ_PORT", value_parser)]
    port: u16,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    begin_logging(args.verbose);

    let timeout = match Duration::try_from_secs_f64(args.timeout) {
        Ok(timeout) => timeout,
        Err(error) => {
            eprintln!("invalid timeout \"{}\": {error}", args.timeout);
            process::exit(1);
        }
    };

    let mut config = ResolverConfig {
        timeout,
        ..ResolverConfig::default()
    };
    if !args.root_hints.is_empty() {
        config.root_hints = args.root_hints;
    }

    let resolver = Resolver::new(Arc::new(UdpTransport::with_port(args.port)), config);

    let start = Instant::now();
    let mut total_metrics = Metrics::new();

    for name in &args.names {
        let name_start = Instant::now();
        let (metrics, records) = resolver.host_records_with_metrics(name).await;

        for line in format_records(&records) {
            println!("{line}");
        }

        tracing::info!(%name, %metrics, "done");
        total_metrics.merge(&metrics);

        if args.verbose {
            println!(
                "[Time for {name}: {:.3}s]",
                name_start.elapsed().as_secs_f64()
            );
        }
    }

    tracing::info!(metrics = %total_metrics, "all done");

    if args.verbose {
        println!(
            "[Total execution time: {:.3}s]",
            start.elapsed().as_secs_f64()
        );
    }
}
