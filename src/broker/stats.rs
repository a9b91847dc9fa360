//! Broker and subscriber counters
//!
//! Eviction and shutdown are observable only through logs and these
//! counters; no error ever reaches a subscriber beyond its connection
//! closing.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared atomic counters, updated by the control loop and drain tasks
#[derive(Debug, Default)]
pub struct BrokerStats {
    /// Packets accepted from the ingestion queue
    pub packets_ingested: AtomicU64,
    /// Subscribers successfully registered
    pub subscribers_added: AtomicU64,
    /// Subscribers removed for any reason (clean or eviction)
    pub subscribers_removed: AtomicU64,
    /// Subscribers evicted for a stalled queue (enqueue bound exceeded)
    pub subscribers_evicted: AtomicU64,
    /// Currently registered subscribers
    pub active_subscribers: AtomicU64,
    /// Records written to subscriber connections
    pub packets_written: AtomicU64,
    /// Payload bytes written to subscriber connections
    pub bytes_written: AtomicU64,
}

impl BrokerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_ingested: self.packets_ingested.load(Ordering::Relaxed),
            subscribers_added: self.subscribers_added.load(Ordering::Relaxed),
            subscribers_removed: self.subscribers_removed.load(Ordering::Relaxed),
            subscribers_evicted: self.subscribers_evicted.load(Ordering::Relaxed),
            active_subscribers: self.active_subscribers.load(Ordering::Relaxed),
            packets_written: self.packets_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`BrokerStats`] at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub packets_ingested: u64,
    pub subscribers_added: u64,
    pub subscribers_removed: u64,
    pub subscribers_evicted: u64,
    pub active_subscribers: u64,
    pub packets_written: u64,
    pub bytes_written: u64,
}
