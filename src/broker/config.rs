//! Broker configuration

use std::time::Duration;

use crate::wire::DEFAULT_SNAPLEN;

/// Tuning knobs for the broadcast broker
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Bounded wait for enqueueing a packet to one subscriber before that
    /// subscriber is evicted as stalled
    pub client_timeout: Duration,

    /// Per-write time bound applied by drain tasks against the connection
    pub write_timeout: Duration,

    /// Capacity of the ingestion queue (how far the packet source may run
    /// ahead of broadcast processing)
    pub ingest_capacity: usize,

    /// Capacity of each subscriber's outbound packet queue
    pub subscriber_queue_capacity: usize,

    /// Snap length advertised in each subscriber's pcap global header
    pub snaplen: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            client_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(5),
            ingest_capacity: 100,
            subscriber_queue_capacity: 100,
            snaplen: DEFAULT_SNAPLEN,
        }
    }
}

impl BrokerConfig {
    /// Set the per-subscriber enqueue timeout
    pub fn client_timeout(mut self, timeout: Duration) -> Self {
        self.client_timeout = timeout;
        self
    }

    /// Set the per-write connection timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the ingestion queue capacity (minimum 1)
    pub fn ingest_capacity(mut self, capacity: usize) -> Self {
        self.ingest_capacity = capacity.max(1);
        self
    }

    /// Set each subscriber's queue capacity (minimum 1)
    pub fn subscriber_queue_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_queue_capacity = capacity.max(1);
        self
    }

    /// Set the snap length written in pcap headers
    pub fn snaplen(mut self, snaplen: u32) -> Self {
        self.snaplen = snaplen;
        self
    }
}
