//! The broadcast broker: one packet stream in, N subscriber streams out
//!
//! # Architecture
//!
//! ```text
//!   packet source ──► ingestion queue ──►┌──────────────────┐
//!                                        │   control loop   │
//!   listener ───────── add/remove ──────►│ owns the registry│
//!                                        └────────┬─────────┘
//!                             per-subscriber queue│(bounded)
//!                  ┌──────────────┬───────────────┤
//!                  ▼              ▼               ▼
//!             drain task     drain task      drain task
//!                  │              │               │
//!             pcap writer    pcap writer     pcap writer
//!                  ▼              ▼               ▼
//!                 TCP            TCP             TCP
//! ```
//!
//! The control loop is the registry's only owner; all interaction is
//! message passing, so there is no lock to take and no iteration to guard.
//! Backpressure is bounded-time per subscriber: a queue that stays full for
//! `client_timeout` gets its owner evicted, never stalling ingestion or the
//! other subscribers beyond that bound.
//!
//! # Zero-copy fan-out
//!
//! Packets carry their payload as `bytes::Bytes`; the broadcast step clones
//! the packet per subscriber, but the payload is reference-counted, not
//! copied.

pub mod config;
pub mod core;
pub mod stats;
pub mod subscriber;

pub use config::BrokerConfig;
pub use self::core::{Broker, BrokerHandle, PacketSender};
pub use stats::{BrokerStats, StatsSnapshot};
pub use subscriber::SubscriberHandle;
