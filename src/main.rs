//! pcap-relay binary
//!
//! Reads a pcap stream from stdin and relays every packet to all connected
//! PCAP-over-IP subscribers:
//!
//! ```text
//! tcpdump -i eth0 -w - -U | pcap-relay --listen 0.0.0.0:4242
//! ```

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use pcap_relay::broker::{Broker, BrokerConfig};
use pcap_relay::server::{RelayServer, ServerConfig, DEFAULT_LISTEN_ADDR};
use pcap_relay::source::pump;
use pcap_relay::wire::PcapReader;

#[derive(Debug, Parser)]
#[command(name = "pcap-relay", version, about = "PCAP-over-IP broadcast relay")]
struct Args {
    /// Listen address for subscriber connections (eg: localhost:4242)
    #[arg(long, env = "LISTEN_ADDRESS", default_value = DEFAULT_LISTEN_ADDR)]
    listen: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

fn init_logging(args: &Args) {
    let default_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    tracing::info!("Reading pcap data from stdin, EOF to stop");
    let reader = PcapReader::new(BufReader::new(tokio::io::stdin()))
        .await
        .context("read pcap header from stdin")?;
    tracing::debug!(
        link_type = %reader.link_type(),
        snaplen = reader.snaplen(),
        "Opened pcap stream"
    );

    let (broker, handle, input) = Broker::new(BrokerConfig::default(), reader.link_type());

    let server = RelayServer::bind(ServerConfig::with_addr(args.listen), handle)
        .await
        .context("bind listen address")?;

    // One shutdown signal fans out to the broker and the listener
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let wait_for_shutdown = |mut rx: watch::Receiver<bool>| async move {
        let _ = rx.changed().await;
    };

    let mut broker_task = tokio::spawn(broker.run(wait_for_shutdown(shutdown_rx.clone())));
    let server_task = tokio::spawn(server.run_until(wait_for_shutdown(shutdown_rx)));
    tokio::spawn(async move {
        // Source exhaustion drops the sender, which shuts the broker down
        match pump(reader, input).await {
            Ok(count) => tracing::debug!(packets = count, "Source pump finished"),
            Err(e) => tracing::error!(error = %e, "Source pump failed"),
        }
    });

    let broker_done = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, shutting down");
            false
        }
        _ = &mut broker_task => {
            tracing::debug!("Broker stopped");
            true
        }
    };

    let _ = shutdown_tx.send(true);
    if !broker_done {
        let _ = broker_task.await;
    }
    let _ = server_task.await;

    tracing::debug!("Shutdown complete");
    Ok(())
}
