use anyhow::{anyhow, Context};
use clap::Parser;
use std::fs::File;
use std::io;
use std::net::SocketAddr;
use std::process::ExitCode;
use tokio::net::lookup_host;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use tftp_upgrade::{Cli, ErrorCode, Session, TransferError, UdpTransport};

const EXIT_FAILURE: u8 = 1;
const EXIT_UNRESOLVED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    eprintln!(
        "\nTFTP Upgrade Client Version {}",
        env!("CARGO_PKG_VERSION")
    );

    let peer = match resolve(&args.destination, args.port).await {
        Ok(peer) => peer,
        Err(e) => {
            eprintln!("\nERROR: {e:#}");
            return ExitCode::from(EXIT_UNRESOLVED);
        }
    };

    match run(&args, peer).await {
        Ok(()) => {
            println!("\nAllow a couple of minutes for the update to be flashed to the device\n");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("\nERROR: {e:#}");
            if let Some(TransferError::Remote { .. }) = e.downcast_ref::<TransferError>() {
                print_error_codes();
            }
            eprintln!("ERROR: Upgrade failed\n");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn resolve(destination: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = lookup_host((destination, port))
        .await
        .with_context(|| format!("destination {destination} is not resolvable"))?
        .collect();
    // The devices we talk to are IPv4-only; prefer v4 when the name has both.
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or(anyhow!("destination {destination} is not resolvable"))
}

async fn run(args: &Cli, peer: SocketAddr) -> anyhow::Result<()> {
    let mut file = File::open(&args.file)
        .with_context(|| format!("unable to open file {}", args.file.display()))?;
    let transport = UdpTransport::bind_for(peer)
        .await
        .context("unable to create UDP socket")?;
    debug!(local = %transport.local_addr()?, %peer, "socket ready");

    let session = Session::new(transport, peer, args.transfer_config(), io::stdout());
    let summary = session.upload(&mut file).await?;
    info!(
        blocks = summary.blocks,
        bytes = summary.bytes,
        retransmissions = summary.retransmissions,
        "cost: {:.3}s",
        summary.elapsed.as_secs_f64()
    );
    Ok(())
}

fn print_error_codes() {
    eprintln!("\nError Codes:");
    for code in ErrorCode::ALL {
        eprintln!("    {} - {}", code.code(), code.description());
    }
    eprintln!();
}
