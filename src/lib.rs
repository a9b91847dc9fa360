//! PCAP-over-IP broadcast relay
//!
//! Ingests one stream of captured packets and relays every packet to an
//! arbitrary, changing set of TCP subscribers, each of which receives a
//! standard streamed pcap file (global header, then records). Slow or dead
//! subscribers are evicted within a bounded time and never stall ingestion
//! or other subscribers.
//!
//! # Components
//!
//! - [`broker`] — the core: a lock-free, single-owner control loop that
//!   multiplexes the inbound stream onto bounded per-subscriber queues,
//!   one dedicated drain task per subscriber.
//! - [`wire`] — the classic libpcap stream codec, byte-compatible with
//!   existing capture tooling.
//! - [`server`] — TCP accept loop registering subscribers.
//! - [`source`] — pulls packets from a capture stream into the broker.
//!
//! # Example
//!
//! ```no_run
//! use pcap_relay::broker::{Broker, BrokerConfig};
//! use pcap_relay::server::{RelayServer, ServerConfig};
//! use pcap_relay::source::pump;
//! use pcap_relay::wire::PcapReader;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let reader = PcapReader::new(tokio::io::stdin()).await?;
//!     let (broker, handle, input) = Broker::new(BrokerConfig::default(), reader.link_type());
//!
//!     let server = RelayServer::bind(ServerConfig::default(), handle).await?;
//!     tokio::spawn(server.run_until(std::future::pending()));
//!     tokio::spawn(broker.run(std::future::pending()));
//!
//!     pump(reader, input).await?;
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod error;
pub mod packet;
pub mod server;
pub mod source;
pub mod wire;

pub use broker::{Broker, BrokerConfig, BrokerHandle, PacketSender, SubscriberHandle};
pub use error::{Error, Result};
pub use packet::{CaptureInfo, LinkType, Packet};
pub use server::{RelayServer, ServerConfig};
pub use wire::{PcapReader, PcapWriter};
